//! Warm-boot persistence: init, dump, replay, clean and the diagnostic
//! dump.
//!
//! A dump is a JSON-lines stream:
//!
//! 1. one `header` record carrying the dump format version and the schema
//!    version the store was running
//! 2. one `object` record per live object, referenced objects before their
//!    referrers, ties broken by handle
//! 3. `fixup` records restoring handle attributes that were stripped from
//!    `object` records to break reference cycles
//! 4. `counters` records with the stats cache
//!
//! Replay recreates every object under its original handle, so handles
//! stored by adapters (and in hardware) stay valid across the restart.

use crate::attribute::{AttrId, AttrValue, Attribute, AttributeSet};
use crate::config::StoreConfig;
use crate::counters::Counter;
use crate::error::{StoreError, StoreResult};
use crate::handle::Handle;
use crate::schema::SchemaRegistry;
use crate::store::{CreateMode, StoreState, SwitchStore};
use log::{debug, info, warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Bumped whenever the record layout changes.
pub const DUMP_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum DumpRecord {
    Header {
        format_version: u32,
        schema_version: String,
        objects: usize,
    },
    Object {
        type_name: String,
        handle: Handle,
        attrs: AttributeSet,
    },
    Fixup {
        handle: Handle,
        attr: Attribute,
    },
    Counters {
        handle: Handle,
        counters: Vec<Counter>,
    },
}

/// Record counts of one dump or replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpSummary {
    pub objects: usize,
    pub fixups: usize,
    pub counters: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

/// Orders live objects so every referenced object precedes its referrers.
///
/// Returns the order plus the `(src, attr)` pairs whose value closes a
/// cycle and must be deferred to a fixup.
fn dependency_order(state: &StoreState) -> (Vec<Handle>, BTreeSet<(Handle, AttrId)>) {
    let objects: BTreeMap<Handle, &AttributeSet> = state
        .tables
        .iter()
        .flat_map(|(ot, table)| table.iter().map(move |(id, attrs)| (Handle::new(*ot, id), attrs)))
        .collect();

    let mut marks: HashMap<Handle, Mark> = HashMap::with_capacity(objects.len());
    let mut order = Vec::with_capacity(objects.len());
    let mut deferred = BTreeSet::new();

    for (root, attrs) in &objects {
        if marks.contains_key(root) {
            continue;
        }
        marks.insert(*root, Mark::Active);
        let mut stack = vec![(*root, attrs.handle_edges(), 0usize)];

        while let Some(top) = stack.last_mut() {
            if top.2 == top.1.len() {
                let done = top.0;
                stack.pop();
                marks.insert(done, Mark::Done);
                order.push(done);
                continue;
            }
            let src = top.0;
            let (attr_id, dst) = top.1[top.2];
            top.2 += 1;
            match marks.get(&dst).copied() {
                Some(Mark::Active) => {
                    deferred.insert((src, attr_id));
                }
                Some(Mark::Done) => {}
                None => {
                    if let Some(dst_attrs) = objects.get(&dst) {
                        marks.insert(dst, Mark::Active);
                        stack.push((dst, dst_attrs.handle_edges(), 0));
                    }
                }
            }
        }
    }
    (order, deferred)
}

/// The value written in place of a deferred attribute.
fn stripped(value: &AttrValue) -> AttrValue {
    match value {
        AttrValue::List(_) => AttrValue::List(Vec::new()),
        _ => AttrValue::Handle(Handle::NULL),
    }
}

impl SwitchStore {
    /// Loads the schema and builds a store, replaying `dump_file` when
    /// `warm_init` is set.
    ///
    /// A warm init without an existing dump file falls back to a cold
    /// start.
    pub fn init(
        schema_path: impl AsRef<Path>,
        warm_init: bool,
        dump_file: Option<&Path>,
        override_log_level: Option<LevelFilter>,
    ) -> StoreResult<Self> {
        Self::init_with(schema_path, warm_init, dump_file, override_log_level, |_| {})
    }

    /// Like [`init`](Self::init), calling `register` on the empty store
    /// before any replay so adapters can install their hooks first.
    pub fn init_with(
        schema_path: impl AsRef<Path>,
        warm_init: bool,
        dump_file: Option<&Path>,
        override_log_level: Option<LevelFilter>,
        register: impl FnOnce(&SwitchStore),
    ) -> StoreResult<Self> {
        if let Some(level) = override_log_level {
            log::set_max_level(level);
        }
        let schema = SchemaRegistry::load(schema_path)?;
        let store = SwitchStore::new(schema);
        store.context.set_dump_path(dump_file.map(Path::to_path_buf));
        info!(
            "Store initialized with schema {} ({} types), warm_init={}",
            store.schema.version(),
            store.schema.types().count(),
            warm_init
        );
        register(&store);

        if warm_init {
            match dump_file {
                Some(path) if path.exists() => {
                    store.object_replay(true)?;
                }
                _ => warn!("Warm init requested but no dump file found, starting cold"),
            }
        }
        Ok(store)
    }

    /// Config-driven [`init`](Self::init).
    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let store = Self::init(
            &config.schema.path,
            config.warm_boot.enabled,
            Some(config.warm_boot.dump_path.as_path()),
            config.log_level()?,
        )?;
        store.set_scan_batch_size(config.iteration.batch_size);
        Ok(store)
    }

    /// Writes the warm-boot dump to `path`.
    pub fn object_info_dump(&self, path: impl AsRef<Path>) -> StoreResult<DumpSummary> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = BufWriter::new(File::create(path)?);
        let summary = self.dump_to(&mut writer)?;
        writer.flush()?;
        info!(
            "Dumped {} objects, {} fixups, {} counter sets to {}",
            summary.objects,
            summary.fixups,
            summary.counters,
            path.display()
        );
        Ok(summary)
    }

    /// Writes the warm-boot dump to any writer. Takes a fresh counter
    /// backup first.
    pub fn dump_to<W: Write>(&self, writer: &mut W) -> StoreResult<DumpSummary> {
        let _batch = self.store_lock.lock();
        self.object_backup_stats_cache()?;

        let mut records = Vec::new();
        let mut fixups = Vec::new();
        {
            let state = self.state.read();
            let (order, deferred) = dependency_order(&state);
            records.push(DumpRecord::Header {
                format_version: DUMP_FORMAT_VERSION,
                schema_version: self.schema.version().to_string(),
                objects: order.len(),
            });
            for handle in order {
                let mut attrs = state.attrs(handle)?.clone();
                let cut: Vec<AttrId> = deferred
                    .range((handle, AttrId::MIN)..=(handle, AttrId::MAX))
                    .map(|(_, id)| *id)
                    .collect();
                for id in cut {
                    if let Some(value) = attrs.get(id).cloned() {
                        attrs.set(id, stripped(&value));
                        fixups.push(DumpRecord::Fixup {
                            handle,
                            attr: Attribute { id, value },
                        });
                    }
                }
                records.push(DumpRecord::Object {
                    type_name: self.schema.type_name(handle.object_type()).to_string(),
                    handle,
                    attrs,
                });
            }
        }

        let mut summary = DumpSummary {
            objects: records.len() - 1,
            fixups: fixups.len(),
            counters: 0,
        };
        records.append(&mut fixups);
        for (handle, counters) in self.stats_cache_snapshot() {
            records.push(DumpRecord::Counters { handle, counters });
            summary.counters += 1;
        }

        for record in &records {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
        }
        Ok(summary)
    }

    /// Replays the dump file the store was initialized with.
    pub fn object_replay(&self, warm_init: bool) -> StoreResult<DumpSummary> {
        let path = self
            .context
            .dump_path()
            .ok_or_else(|| StoreError::Config("no dump file configured".to_string()))?;
        info!("Replaying warm-boot dump {}", path.display());
        let reader = BufReader::new(File::open(&path)?);
        self.replay_from(reader, warm_init)
    }

    /// Recreates every object of a dump under its original handle.
    ///
    /// Only `create_after` hooks run, and auto-objects are not cascaded
    /// since they are part of the dump themselves. The warm-init flag is
    /// set while records are applied. Afterwards the cached counters are
    /// handed to [`object_restore_stats_cache`](Self::object_restore_stats_cache).
    pub fn replay_from<R: BufRead>(&self, reader: R, warm_init: bool) -> StoreResult<DumpSummary> {
        let was_warm = self.is_warm_init();
        self.warm_init_begin();
        let result = self.replay_records(reader);
        if !was_warm {
            self.warm_init_end();
        }
        let mut summary = result?;
        summary.counters = self.object_restore_stats_cache(warm_init)?;
        info!(
            "Replay restored {} objects, {} fixups, {} counter sets",
            summary.objects, summary.fixups, summary.counters
        );
        Ok(summary)
    }

    fn replay_records<R: BufRead>(&self, reader: R) -> StoreResult<DumpSummary> {
        let _batch = self.store_lock.lock();
        let mut expected_objects = None;
        let mut summary = DumpSummary::default();
        let mut fixups = Vec::new();
        let mut counters = Vec::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: DumpRecord = serde_json::from_str(&line).map_err(|e| {
                StoreError::fatal(format!("dump line {}: {}", lineno + 1, e))
            })?;
            match (expected_objects, record) {
                (
                    None,
                    DumpRecord::Header {
                        format_version,
                        schema_version,
                        objects,
                    },
                ) => {
                    if format_version != DUMP_FORMAT_VERSION {
                        return Err(StoreError::fatal(format!(
                            "dump format {} unsupported, expected {}",
                            format_version, DUMP_FORMAT_VERSION
                        )));
                    }
                    if schema_version != self.schema.version() {
                        return Err(StoreError::fatal(format!(
                            "dump schema version {} does not match {}",
                            schema_version,
                            self.schema.version()
                        )));
                    }
                    expected_objects = Some(objects);
                }
                (None, _) => {
                    return Err(StoreError::fatal("dump does not start with a header"));
                }
                (Some(_), DumpRecord::Header { .. }) => {
                    return Err(StoreError::fatal(format!(
                        "dump line {}: unexpected second header",
                        lineno + 1
                    )));
                }
                (Some(_), DumpRecord::Object { handle, attrs, .. }) => {
                    self.create_internal(
                        handle.object_type(),
                        Some(handle.id()),
                        attrs,
                        CreateMode::REPLAY,
                    )?;
                    summary.objects += 1;
                }
                (Some(_), DumpRecord::Fixup { handle, attr }) => fixups.push((handle, attr)),
                (Some(_), DumpRecord::Counters { handle, counters: c }) => {
                    counters.push((handle, c))
                }
            }
        }

        match expected_objects {
            None => return Err(StoreError::fatal("empty dump")),
            Some(n) if n != summary.objects => {
                return Err(StoreError::fatal(format!(
                    "dump header announced {} objects, found {}",
                    n, summary.objects
                )));
            }
            Some(_) => {}
        }

        for (handle, attr) in fixups {
            self.apply_fixup(handle, attr)?;
            summary.fixups += 1;
        }
        self.load_stats_cache(counters);
        Ok(summary)
    }

    /// Restores a deferred attribute. Bypasses the create-only check and
    /// hooks, since the value was already accepted before the dump.
    fn apply_fixup(&self, handle: Handle, attr: Attribute) -> StoreResult<()> {
        let desc = self.schema.get(handle.object_type())?;
        desc.require_attr(attr.id)?.check_value(&desc.name, &attr.value)?;
        let mut state = self.state.write();
        for dst in attr.value.handles() {
            if !state.exists(dst) {
                return Err(StoreError::fatal(format!(
                    "fixup of {} references missing object {}",
                    handle, dst
                )));
            }
        }
        state.replace_value(handle, attr.id, attr.value)?;
        debug!("fixup applied to {} attribute {}", handle, attr.id);
        Ok(())
    }

    /// Drops every object, reference, advisory lock and cached counter
    /// without running hooks.
    pub fn object_info_clean(&self) {
        let _batch = self.store_lock.lock();
        self.state.write().clear();
        self.object_locks.clear_all();
        self.stats_cache.lock().clear();
        info!("Store cleaned");
    }

    /// Human-readable listing of every object, for debugging only.
    pub fn object_dump<W: Write>(&self, out: &mut W) -> StoreResult<()> {
        let state = self.state.read();
        for desc in self.schema.types() {
            let table = state.table(desc.object_type)?;
            if table.len() == 0 {
                continue;
            }
            writeln!(
                out,
                "{} (type {}): {} objects",
                desc.name,
                desc.object_type,
                table.len()
            )?;
            for (id, attrs) in table.iter() {
                let handle = Handle::new(desc.object_type, id);
                let inbound = state.refs.refs_to(handle).len();
                writeln!(out, "  {} refs={}", handle, inbound)?;
                for (attr_id, value) in attrs.iter() {
                    let name = desc.attr(attr_id).map(|a| a.name.as_str()).unwrap_or("?");
                    writeln!(out, "    {} = {}", name, value)?;
                }
            }
        }
        Ok(())
    }
}
