//! Integration tests for object create/delete, attribute access, key lookup
//! and iteration.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use switch_store::{
    status_of, AttrValue, Attribute, AttributeSet, Handle, IpPrefix, MacAddress, ObjectType,
    StoreError, SwitchStatus, DEFAULT_SCAN_BATCH, MAX_OBJECT_ID,
};

#[test]
fn test_route_with_missing_nexthop_then_glean_redirect() {
    let store = new_store();
    let vrf = create_vrf(&store, 1);
    let rif = create_rif(&store, vrf);
    let prefix: IpPrefix = "10.0.0.0/24".parse().unwrap();
    let route_attrs = |nh: Handle| {
        AttributeSet::new()
            .with(route::VRF, vrf)
            .with(route::PREFIX, prefix)
            .with(route::NEXTHOP, nh)
    };

    // nexthop does not exist yet
    let missing = Handle::new(nexthop::TYPE, 1);
    let err = store.object_create(route::TYPE, route_attrs(missing)).unwrap_err();
    assert!(matches!(err, StoreError::InvalidAttribute { .. }));
    assert_eq!(store.object_count(route::TYPE).unwrap(), 0);

    let h1 = create_nexthop(&store, rif, "10.0.0.1");
    let r1 = store.object_create(route::TYPE, route_attrs(h1)).unwrap();

    let key = AttributeSet::new()
        .with(route::VRF, vrf)
        .with(route::PREFIX, prefix);
    assert_eq!(store.object_id_get_wkey(route::TYPE, &key).unwrap(), r1);

    let err = store.object_delete(h1).unwrap_err();
    assert!(matches!(err, StoreError::InUse { .. }));
    assert_eq!(err.status(), SwitchStatus::ResourceInUse);
    assert!(!store.object_ready_for_delete(h1));

    // redirect to the rif glean
    store.attribute_set_value(r1, route::NEXTHOP, rif).unwrap();
    assert!(store.object_ready_for_delete(h1));
    store.object_delete(h1).unwrap();
    assert!(!store.object_exists(h1));
    assert_eq!(store.attribute_get_as::<Handle>(r1, route::NEXTHOP).unwrap(), rif);
}

#[test]
fn test_create_fills_schema_defaults() {
    let store = new_store();
    let vrf = create_vrf(&store, 1);
    let rif = create_rif(&store, vrf);

    let attrs = store.attribute_get_all(rif).unwrap();
    assert_eq!(attrs.len(), 3);
    assert_eq!(attrs.get_as::<u32>(rif::MTU).unwrap(), 9100);
    assert_eq!(attrs.get_as::<MacAddress>(rif::SRC_MAC).unwrap(), MacAddress::ZERO);
}

#[test]
fn test_create_validation_failures() {
    let store = new_store();

    // missing mandatory key
    let err = store.object_create(vrf::TYPE, AttributeSet::new()).unwrap_err();
    assert!(matches!(err, StoreError::InvalidAttribute { .. }));

    // unknown attribute id
    let attrs = AttributeSet::new().with(vrf::VRF_ID, 1u32).with(42, true);
    assert!(matches!(
        store.object_create(vrf::TYPE, attrs),
        Err(StoreError::InvalidAttribute { .. })
    ));

    // wrong kind
    let attrs = AttributeSet::new().with(vrf::VRF_ID, 1u16);
    assert!(matches!(
        store.object_create(vrf::TYPE, attrs),
        Err(StoreError::InvalidAttribute { .. })
    ));

    // unknown type
    assert!(matches!(
        store.object_create(ObjectType(99), AttributeSet::new()),
        Err(StoreError::InvalidAttribute { .. })
    ));

    assert_eq!(store.object_count(vrf::TYPE).unwrap(), 0);
}

#[test]
fn test_enum_and_handle_type_restrictions() {
    let store = new_store();
    let vrf = create_vrf(&store, 1);
    let prefix: IpPrefix = "10.1.0.0/16".parse().unwrap();
    let base = AttributeSet::new()
        .with(route::VRF, vrf)
        .with(route::PREFIX, prefix);

    let bad_enum = base.clone().with(route::PACKET_ACTION, AttrValue::Enum(7));
    assert!(matches!(
        store.object_create(route::TYPE, bad_enum),
        Err(StoreError::InvalidAttribute { .. })
    ));

    // a vrf is not a permitted nexthop
    let bad_ref = base.clone().with(route::NEXTHOP, vrf);
    assert!(matches!(
        store.object_create(route::TYPE, bad_ref),
        Err(StoreError::InvalidAttribute { .. })
    ));

    // null handle is always permitted
    let r = store
        .object_create(route::TYPE, base.with(route::NEXTHOP, Handle::NULL))
        .unwrap();
    assert_eq!(store.attribute_get(r, route::PACKET_ACTION).unwrap().value, AttrValue::Enum(0));
}

#[test]
fn test_key_conflict_on_create() {
    let store = new_store();
    create_vrf(&store, 7);
    let err = store
        .object_create(vrf::TYPE, AttributeSet::new().with(vrf::VRF_ID, 7u32))
        .unwrap_err();
    assert!(matches!(err, StoreError::KeyConflict { .. }));
    assert_eq!(err.status(), SwitchStatus::ItemAlreadyExists);
    assert_eq!(store.object_count(vrf::TYPE).unwrap(), 1);
}

#[test]
fn test_key_lookup() {
    let store = new_store();
    let a = create_vrf(&store, 1);
    let b = create_vrf(&store, 2);

    let key = |id: u32| AttributeSet::new().with(vrf::VRF_ID, id);
    assert_eq!(store.object_id_get_wkey(vrf::TYPE, &key(1)).unwrap(), a);
    assert_eq!(store.object_id_get_wkey(vrf::TYPE, &key(2)).unwrap(), b);
    assert!(matches!(
        store.object_id_get_wkey(vrf::TYPE, &key(3)),
        Err(StoreError::ItemNotFound { .. })
    ));

    // non-key attributes are not a lookup key
    let rif = create_rif(&store, a);
    let by_mtu = AttributeSet::new().with(rif::MTU, 9100u32);
    assert!(matches!(
        store.object_id_get_wkey(rif::TYPE, &by_mtu),
        Err(StoreError::InvalidAttribute { .. })
    ));
    assert!(store.object_exists(rif));
}

#[test]
fn test_fdb_keyed_by_vlan_and_mac() {
    let store = new_store();
    let port = create_port(&store, 1);
    let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();
    let entry = store
        .object_create(
            fdb::TYPE,
            AttributeSet::new()
                .with(fdb::VLAN, 100u16)
                .with(fdb::MAC, mac)
                .with(fdb::PORT, port),
        )
        .unwrap();
    // same mac in another vlan is a different entry
    let other = store
        .object_create(
            fdb::TYPE,
            AttributeSet::new().with(fdb::VLAN, 200u16).with(fdb::MAC, mac),
        )
        .unwrap();
    assert_ne!(entry, other);

    let key = AttributeSet::new().with(fdb::VLAN, 100u16).with(fdb::MAC, mac);
    assert_eq!(store.object_id_get_wkey(fdb::TYPE, &key).unwrap(), entry);
}

#[test]
fn test_check_for_existing_and_validate_attrs() {
    let store = new_store();
    let vrf = create_vrf(&store, 5);
    let same = AttributeSet::new().with(vrf::VRF_ID, 5u32);
    let fresh = AttributeSet::new().with(vrf::VRF_ID, 6u32);

    assert_eq!(store.check_for_existing(vrf::TYPE, &same).unwrap(), Some(vrf));
    assert_eq!(store.check_for_existing(vrf::TYPE, &fresh).unwrap(), None);
    assert!(matches!(
        store.validate_attrs(vrf::TYPE, &same),
        Err(StoreError::KeyConflict { .. })
    ));
    store.validate_attrs(vrf::TYPE, &fresh).unwrap();
    // validation has no side effects
    assert_eq!(store.object_count(vrf::TYPE).unwrap(), 1);
}

#[test]
fn test_create_by_id_and_by_handle() {
    let store = new_store();
    let h = store
        .object_create_by_id(vrf::TYPE, 40, AttributeSet::new().with(vrf::VRF_ID, 1u32))
        .unwrap();
    assert_eq!(h, Handle::new(vrf::TYPE, 40));
    assert_eq!(store.object_get_by_id(vrf::TYPE, 40).unwrap(), h);

    let err = store
        .object_create_by_hdl(h, AttributeSet::new().with(vrf::VRF_ID, 2u32))
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));

    let h2 = store
        .object_create_by_hdl(Handle::new(vrf::TYPE, 3), AttributeSet::new().with(vrf::VRF_ID, 2u32))
        .unwrap();
    assert_eq!(h2.id(), 3);

    // allocation fills the gaps below the caller-chosen ids
    let h3 = create_vrf(&store, 3);
    assert_eq!(h3.id(), 1);

    assert!(matches!(
        store.object_create_by_id(vrf::TYPE, 0, AttributeSet::new().with(vrf::VRF_ID, 9u32)),
        Err(StoreError::InvalidAttribute { .. })
    ));
    assert!(matches!(
        store.object_get_by_id(vrf::TYPE, 2),
        Err(StoreError::ItemNotFound { .. })
    ));
}

#[test]
fn test_capacity_exhausted_and_released() {
    let store = new_store();
    let tunnel = |name: &str| AttributeSet::new().with(tunnel::NAME, name);
    let a = store.object_create(tunnel::TYPE, tunnel("a")).unwrap();
    store.object_create(tunnel::TYPE, tunnel("b")).unwrap();

    let err = store.object_create(tunnel::TYPE, tunnel("c")).unwrap_err();
    assert!(matches!(err, StoreError::ResourceExhausted { .. }));
    assert_eq!(status_of(&Err::<(), _>(err)), SwitchStatus::InsufficientResources);

    store.object_delete(a).unwrap();
    let c = store.object_create(tunnel::TYPE, tunnel("c")).unwrap();
    assert_eq!(c.id(), a.id());
}

#[test]
fn test_delete_errors() {
    let store = new_store();
    let h = Handle::new(vrf::TYPE, 1);
    assert!(matches!(store.object_delete(h), Err(StoreError::ItemNotFound { .. })));

    let vrf = create_vrf(&store, 1);
    store.object_delete_by_id(vrf::TYPE, vrf.id()).unwrap();
    assert!(matches!(store.object_delete(vrf), Err(StoreError::ItemNotFound { .. })));
}

#[test]
fn test_attribute_set_rules() {
    let store = new_store();
    let vrf = create_vrf(&store, 1);
    let other_vrf = create_vrf(&store, 2);
    let rif = create_rif(&store, vrf);

    store.attribute_set_value(rif, rif::MTU, 1500u32).unwrap();
    assert_eq!(store.attribute_get_as::<u32>(rif, rif::MTU).unwrap(), 1500);

    let err = store.attribute_set_value(rif, rif::VRF, other_vrf).unwrap_err();
    assert!(matches!(err, StoreError::ReadOnly { .. }));
    assert_eq!(err.status(), SwitchStatus::ReadOnlyAttribute);
    assert_eq!(store.attribute_get_as::<Handle>(rif, rif::VRF).unwrap(), vrf);

    assert!(matches!(
        store.attribute_set(rif, Attribute::new(rif::MTU, true)),
        Err(StoreError::InvalidAttribute { .. })
    ));
    assert!(matches!(
        store.attribute_set(Handle::new(rif::TYPE, 9), Attribute::new(rif::MTU, 1u32)),
        Err(StoreError::ItemNotFound { .. })
    ));
}

#[test]
fn test_attribute_set_key_conflict_leaves_value() {
    let store = new_store();
    let vrf = create_vrf(&store, 1);
    let rif = create_rif(&store, vrf);
    create_nexthop(&store, rif, "10.0.0.1");
    let nh2 = create_nexthop(&store, rif, "10.0.0.2");

    let taken: switch_store::IpAddress = "10.0.0.1".parse().unwrap();
    let err = store.attribute_set_value(nh2, nexthop::IP, taken).unwrap_err();
    assert!(matches!(err, StoreError::KeyConflict { .. }));
    assert_eq!(
        store.attribute_get(nh2, nexthop::IP).unwrap().value.to_string(),
        "10.0.0.2"
    );

    let free: switch_store::IpAddress = "10.0.0.3".parse().unwrap();
    store.attribute_set_value(nh2, nexthop::IP, free).unwrap();
    let key = AttributeSet::new().with(nexthop::RIF, rif).with(nexthop::IP, free);
    assert_eq!(store.object_id_get_wkey(nexthop::TYPE, &key).unwrap(), nh2);
}

#[test]
fn test_attribute_get_typed_and_missing() {
    let store = new_store();
    let vrf = create_vrf(&store, 1);
    let prefix: IpPrefix = "10.2.0.0/16".parse().unwrap();
    let r = store
        .object_create(
            route::TYPE,
            AttributeSet::new().with(route::VRF, vrf).with(route::PREFIX, prefix),
        )
        .unwrap();

    assert_eq!(store.attribute_get_as::<IpPrefix>(r, route::PREFIX).unwrap(), prefix);
    let err = store.attribute_get_as::<u32>(r, route::PREFIX).unwrap_err();
    assert!(matches!(
        err,
        StoreError::TypeMismatch {
            expected: "u32",
            found: "prefix"
        }
    ));

    // declared, never set, no default
    assert!(matches!(
        store.attribute_get(r, route::NEXTHOP),
        Err(StoreError::ItemNotFound { .. })
    ));
    // not declared at all
    assert!(matches!(
        store.attribute_get(r, 77),
        Err(StoreError::InvalidAttribute { .. })
    ));
}

#[test]
fn test_with_attributes_borrowed_view() {
    let store = new_store();
    let vrf = create_vrf(&store, 11);
    let id = store
        .with_attributes(vrf, |attrs| attrs.get_as::<u32>(vrf::VRF_ID))
        .unwrap()
        .unwrap();
    assert_eq!(id, 11);
    assert!(store
        .with_attributes(Handle::new(vrf::TYPE, 99), |attrs| attrs.len())
        .is_err());
}

#[test]
fn test_list_attribute_ops() {
    let store = new_store();
    let p = create_port(&store, 1);

    assert_eq!(store.list_len(p, port::VLANS).unwrap(), 0);
    store.list_v_push(p, port::VLANS, 10u16).unwrap();
    store.list_v_push(p, port::VLANS, 30u16).unwrap();
    store.list_v_insert(p, port::VLANS, 1, 20u16).unwrap();
    assert_eq!(
        store.attribute_get_as::<Vec<u16>>(p, port::VLANS).unwrap(),
        vec![10, 20, 30]
    );
    assert_eq!(store.list_len(p, port::VLANS).unwrap(), 3);
    assert_eq!(store.list_v_get(p, port::VLANS, 1).unwrap(), AttrValue::U16(20));
    assert!(matches!(
        store.list_v_get(p, port::VLANS, 3),
        Err(StoreError::ItemNotFound { .. })
    ));

    store.list_v_del(p, port::VLANS, 20u16).unwrap();
    assert_eq!(
        store.attribute_get_as::<Vec<u16>>(p, port::VLANS).unwrap(),
        vec![10, 30]
    );
    assert!(matches!(
        store.list_v_del(p, port::VLANS, 99u16),
        Err(StoreError::ItemNotFound { .. })
    ));

    // element kind, bounds, create-only and non-list attributes
    assert!(matches!(
        store.list_v_push(p, port::VLANS, 5u32),
        Err(StoreError::InvalidAttribute { .. })
    ));
    assert!(matches!(
        store.list_v_insert(p, port::VLANS, 10, 5u16),
        Err(StoreError::InvalidAttribute { .. })
    ));
    assert!(matches!(
        store.list_v_push(p, port::LANES, 8u32),
        Err(StoreError::ReadOnly { .. })
    ));
    assert!(matches!(
        store.list_v_push(p, port::SPEED, 1u32),
        Err(StoreError::InvalidAttribute { .. })
    ));

    store.list_clear(p, port::VLANS).unwrap();
    assert_eq!(store.list_len(p, port::VLANS).unwrap(), 0);
}

#[test]
fn test_first_next_all_iteration() {
    let store = new_store();
    let vrfs: Vec<Handle> = (1..=10).map(|i| create_vrf(&store, i)).collect();

    let first = store.object_get_first_handle(vrf::TYPE).unwrap().unwrap();
    assert_eq!(first, vrfs[0]);
    assert_eq!(store.object_get_next_handles(first, 3).unwrap(), vrfs[1..4].to_vec());
    assert_eq!(store.object_get_all_handles(vrf::TYPE).unwrap(), vrfs);

    // a deleted cursor still works and deleted handles are skipped
    store.object_delete(vrfs[4]).unwrap();
    store.object_delete(vrfs[5]).unwrap();
    assert_eq!(
        store.object_get_next_handles(vrfs[4], 2).unwrap(),
        vec![vrfs[6], vrfs[7]]
    );

    let scanned: Vec<Handle> = store.scan_handles(vrf::TYPE, 3).collect();
    let expected: Vec<Handle> = vrfs
        .iter()
        .copied()
        .filter(|h| *h != vrfs[4] && *h != vrfs[5])
        .collect();
    assert_eq!(scanned, expected);

    assert_eq!(store.object_get_first_handle(tunnel::TYPE).unwrap(), None);
    assert!(store.object_get_first_handle(ObjectType(99)).is_err());
}

#[test]
fn test_minimal_create_has_no_auto_objects() {
    let store = new_store();
    let p = store
        .object_create_minimal(
            port::TYPE,
            AttributeSet::new().with(port::PORT_ID, 3u16),
        )
        .unwrap();
    assert!(store.object_exists(p));
    assert_eq!(store.object_count(queue::TYPE).unwrap(), 0);
    assert_eq!(store.attribute_get_as::<u32>(p, port::SPEED).unwrap(), 10000);
}

#[test]
fn test_out_of_range_ids_name_no_object() {
    let store = new_store();
    let vrf = create_vrf(&store, 1);
    let aliased = (1u64 << 48) | vrf.id();

    assert!(matches!(
        store.object_delete_by_id(vrf::TYPE, aliased),
        Err(StoreError::ItemNotFound { .. })
    ));
    assert!(matches!(
        store.object_get_by_id(vrf::TYPE, aliased),
        Err(StoreError::ItemNotFound { .. })
    ));
    assert!(matches!(
        store.object_get_by_id(vrf::TYPE, 0),
        Err(StoreError::ItemNotFound { .. })
    ));
    assert!(matches!(
        store.object_get_by_id(vrf::TYPE, MAX_OBJECT_ID + 1),
        Err(StoreError::ItemNotFound { .. })
    ));
    assert!(store.object_exists(vrf));
    assert_eq!(store.object_get_by_id(vrf::TYPE, vrf.id()).unwrap(), vrf);

    store.object_delete_by_id(vrf::TYPE, vrf.id()).unwrap();
    assert!(!store.object_exists(vrf));
}

#[test]
fn test_key_lookup_needs_a_key() {
    let store = new_store();
    create_vrf(&store, 1);
    assert!(matches!(
        store.object_id_get_wkey(vrf::TYPE, &AttributeSet::new()),
        Err(StoreError::InvalidAttribute { .. })
    ));
}

#[test]
fn test_object_scan_uses_configured_batch_size() {
    let store = new_store();
    assert_eq!(store.scan_batch_size(), DEFAULT_SCAN_BATCH);
    let handles: Vec<Handle> = (1..=10).map(|i| create_vrf(&store, i)).collect();

    store.set_scan_batch_size(3);
    assert_eq!(store.scan_batch_size(), 3);
    assert_eq!(store.object_scan(vrf::TYPE).collect::<Vec<_>>(), handles);

    store.set_scan_batch_size(0);
    assert_eq!(store.scan_batch_size(), 1);
    assert_eq!(store.object_scan(vrf::TYPE).count(), 10);
}
