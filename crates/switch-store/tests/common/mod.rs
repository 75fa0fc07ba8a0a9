//! Shared fixtures for the store integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use switch_store::{AttributeSet, Handle, SchemaRegistry, SwitchStore};

pub const SCHEMA_JSON: &str = r#"{
  "version": "3.1",
  "objects": [
    { "id": 1, "name": "vrf",
      "attributes": [
        { "id": 1, "name": "vrf_id", "type": "u32", "key": true, "mandatory": true }
      ] },
    { "id": 2, "name": "rif",
      "attributes": [
        { "id": 1, "name": "vrf", "type": "handle", "allowed_types": ["vrf"], "mandatory": true, "create_only": true },
        { "id": 2, "name": "src_mac", "type": "mac", "default": { "mac": "00:00:00:00:00:00" } },
        { "id": 3, "name": "mtu", "type": "u32", "default": { "u32": 9100 } }
      ] },
    { "id": 3, "name": "nexthop",
      "attributes": [
        { "id": 1, "name": "rif", "type": "handle", "allowed_types": ["rif"], "key": true, "mandatory": true },
        { "id": 2, "name": "ip", "type": "ip", "key": true, "mandatory": true }
      ] },
    { "id": 4, "name": "route",
      "attributes": [
        { "id": 1, "name": "vrf", "type": "handle", "allowed_types": ["vrf"], "key": true, "mandatory": true },
        { "id": 2, "name": "prefix", "type": "prefix", "key": true, "mandatory": true },
        { "id": 3, "name": "nexthop", "type": "handle", "allowed_types": ["nexthop", "rif", "nhg"] },
        { "id": 4, "name": "packet_action", "type": "enum", "enum_values": [0, 1, 2], "default": { "enum": 0 } }
      ] },
    { "id": 5, "name": "port", "max_objects": 64,
      "attributes": [
        { "id": 1, "name": "port_id", "type": "u16", "key": true, "mandatory": true },
        { "id": 2, "name": "admin_state", "type": "bool", "default": { "bool": false } },
        { "id": 3, "name": "speed", "type": "u32", "default": { "u32": 10000 } },
        { "id": 4, "name": "lanes", "type": "list<u32>", "create_only": true },
        { "id": 5, "name": "vlans", "type": "list<u16>" }
      ],
      "auto_objects": ["queue", "ingress_pg"],
      "counters": [ { "id": 0, "name": "rx_packets" }, { "id": 1, "name": "tx_packets" } ] },
    { "id": 6, "name": "queue",
      "attributes": [
        { "id": 1, "name": "port_handle", "type": "handle", "allowed_types": ["port"], "parent": true, "create_only": true },
        { "id": 2, "name": "weight", "type": "u8", "default": { "u8": 1 } }
      ],
      "auto_objects": ["scheduler_group"] },
    { "id": 7, "name": "ingress_pg",
      "attributes": [
        { "id": 1, "name": "port_handle", "type": "handle", "allowed_types": ["port"], "parent": true, "create_only": true }
      ] },
    { "id": 8, "name": "scheduler_group",
      "attributes": [
        { "id": 1, "name": "queue_handle", "type": "handle", "allowed_types": ["queue"], "parent": true, "create_only": true }
      ] },
    { "id": 9, "name": "acl_table",
      "attributes": [
        { "id": 1, "name": "name", "type": "string", "key": true, "mandatory": true },
        { "id": 2, "name": "stage", "type": "enum", "enum_values": [0, 1], "create_only": true, "default": { "enum": 0 } },
        { "id": 3, "name": "bind_points", "type": "list<handle>", "allowed_types": ["port", "lag"] }
      ] },
    { "id": 10, "name": "fdb",
      "attributes": [
        { "id": 1, "name": "vlan", "type": "u16", "key": true, "mandatory": true },
        { "id": 2, "name": "mac", "type": "mac", "key": true, "mandatory": true },
        { "id": 3, "name": "port", "type": "handle", "allowed_types": ["port", "lag"] }
      ] },
    { "id": 11, "name": "tunnel", "max_objects": 2,
      "attributes": [
        { "id": 1, "name": "name", "type": "string", "key": true, "mandatory": true }
      ] },
    { "id": 12, "name": "lag",
      "attributes": [
        { "id": 1, "name": "members", "type": "list<handle>", "allowed_types": ["port"] },
        { "id": 2, "name": "stats_port", "type": "handle", "allowed_types": ["port"], "counter": true }
      ] },
    { "id": 13, "name": "nhg",
      "attributes": [
        { "id": 1, "name": "members", "type": "list<handle>", "allowed_types": ["nhg_member"] }
      ] },
    { "id": 14, "name": "nhg_member",
      "attributes": [
        { "id": 1, "name": "group", "type": "handle", "allowed_types": ["nhg"], "mandatory": true },
        { "id": 2, "name": "nexthop", "type": "handle", "allowed_types": ["nexthop"] }
      ] }
  ]
}"#;

pub mod vrf {
    use switch_store::{AttrId, ObjectType};
    pub const TYPE: ObjectType = ObjectType(1);
    pub const VRF_ID: AttrId = 1;
}

pub mod rif {
    use switch_store::{AttrId, ObjectType};
    pub const TYPE: ObjectType = ObjectType(2);
    pub const VRF: AttrId = 1;
    pub const SRC_MAC: AttrId = 2;
    pub const MTU: AttrId = 3;
}

pub mod nexthop {
    use switch_store::{AttrId, ObjectType};
    pub const TYPE: ObjectType = ObjectType(3);
    pub const RIF: AttrId = 1;
    pub const IP: AttrId = 2;
}

pub mod route {
    use switch_store::{AttrId, ObjectType};
    pub const TYPE: ObjectType = ObjectType(4);
    pub const VRF: AttrId = 1;
    pub const PREFIX: AttrId = 2;
    pub const NEXTHOP: AttrId = 3;
    pub const PACKET_ACTION: AttrId = 4;
}

pub mod port {
    use switch_store::{AttrId, ObjectType};
    pub const TYPE: ObjectType = ObjectType(5);
    pub const PORT_ID: AttrId = 1;
    pub const ADMIN_STATE: AttrId = 2;
    pub const SPEED: AttrId = 3;
    pub const LANES: AttrId = 4;
    pub const VLANS: AttrId = 5;
    pub const RX_PACKETS: u16 = 0;
    pub const TX_PACKETS: u16 = 1;
}

pub mod queue {
    use switch_store::{AttrId, ObjectType};
    pub const TYPE: ObjectType = ObjectType(6);
    pub const PORT_HANDLE: AttrId = 1;
    pub const WEIGHT: AttrId = 2;
}

pub mod ingress_pg {
    use switch_store::ObjectType;
    pub const TYPE: ObjectType = ObjectType(7);
}

pub mod scheduler_group {
    use switch_store::{AttrId, ObjectType};
    pub const TYPE: ObjectType = ObjectType(8);
    pub const QUEUE_HANDLE: AttrId = 1;
}

pub mod acl_table {
    use switch_store::{AttrId, ObjectType};
    pub const TYPE: ObjectType = ObjectType(9);
    pub const NAME: AttrId = 1;
    pub const STAGE: AttrId = 2;
    pub const BIND_POINTS: AttrId = 3;
}

pub mod fdb {
    use switch_store::{AttrId, ObjectType};
    pub const TYPE: ObjectType = ObjectType(10);
    pub const VLAN: AttrId = 1;
    pub const MAC: AttrId = 2;
    pub const PORT: AttrId = 3;
}

pub mod tunnel {
    use switch_store::{AttrId, ObjectType};
    pub const TYPE: ObjectType = ObjectType(11);
    pub const NAME: AttrId = 1;
}

pub mod lag {
    use switch_store::{AttrId, ObjectType};
    pub const TYPE: ObjectType = ObjectType(12);
    pub const MEMBERS: AttrId = 1;
    pub const STATS_PORT: AttrId = 2;
}

pub mod nhg {
    use switch_store::{AttrId, ObjectType};
    pub const TYPE: ObjectType = ObjectType(13);
    pub const MEMBERS: AttrId = 1;
}

pub mod nhg_member {
    use switch_store::{AttrId, ObjectType};
    pub const TYPE: ObjectType = ObjectType(14);
    pub const GROUP: AttrId = 1;
    pub const NEXTHOP: AttrId = 2;
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn schema() -> SchemaRegistry {
    SchemaRegistry::from_json_str(SCHEMA_JSON).unwrap()
}

/// Writes the fixture schema into `dir` and returns its path.
pub fn write_schema(dir: &Path) -> PathBuf {
    let path = dir.join("schema.json");
    std::fs::write(&path, SCHEMA_JSON).unwrap();
    path
}

pub fn new_store() -> SwitchStore {
    init_logging();
    SwitchStore::new(schema())
}

pub fn create_vrf(store: &SwitchStore, id: u32) -> Handle {
    store
        .object_create(vrf::TYPE, AttributeSet::new().with(vrf::VRF_ID, id))
        .unwrap()
}

pub fn create_rif(store: &SwitchStore, vrf: Handle) -> Handle {
    store
        .object_create(rif::TYPE, AttributeSet::new().with(rif::VRF, vrf))
        .unwrap()
}

pub fn create_nexthop(store: &SwitchStore, rif: Handle, ip: &str) -> Handle {
    let ip: switch_store::IpAddress = ip.parse().unwrap();
    store
        .object_create(
            nexthop::TYPE,
            AttributeSet::new().with(nexthop::RIF, rif).with(nexthop::IP, ip),
        )
        .unwrap()
}

pub fn create_port(store: &SwitchStore, port_id: u16) -> Handle {
    store
        .object_create(
            port::TYPE,
            AttributeSet::new()
                .with(port::PORT_ID, port_id)
                .with(port::LANES, vec![u32::from(port_id) * 4]),
        )
        .unwrap()
}
