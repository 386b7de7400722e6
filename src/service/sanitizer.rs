//! Strips backend-assigned identifiers before a record is replayed into a
//! new realm.

use crate::domain::{
    ClientRecord, ClientScopeRecord, GroupRecord, IdentityProviderRecord, RealmRecord, RoleRecord,
    UserRecord,
};
use serde_json::{Map, Value};

/// Realm keys that hold nested entity collections
const REALM_ENTITY_KEYS: [&str; 5] = ["users", "clients", "roles", "groups", "defaultGroups"];

pub fn realm(mut record: RealmRecord) -> RealmRecord {
    record.id = None;
    record.not_before = Some(0);
    record.enabled = Some(true);
    record
}

/// Realm record with its nested entity collections removed
pub fn realm_config_only(record: RealmRecord) -> RealmRecord {
    let mut record = realm(record);
    for key in REALM_ENTITY_KEYS {
        record.extra.remove(key);
    }
    record
}

pub fn client(mut record: ClientRecord) -> ClientRecord {
    record.id = None;
    clear_protocol_mapper_ids(&mut record.extra);
    record
}

pub fn client_scope(mut record: ClientScopeRecord) -> ClientScopeRecord {
    record.id = None;
    clear_protocol_mapper_ids(&mut record.extra);
    record
}

/// Flat role: composites are attached in a later pass
pub fn role(mut record: RoleRecord) -> RoleRecord {
    record.id = None;
    record.container_id = None;
    record.composites = None;
    record.composite = Some(false);
    record
}

pub fn identity_provider(mut record: IdentityProviderRecord) -> IdentityProviderRecord {
    record.internal_id = None;
    record
}

/// Clears ids through the whole sub-group tree
pub fn group(mut record: GroupRecord) -> GroupRecord {
    record.id = None;
    record.sub_groups = record.sub_groups.into_iter().map(group).collect();
    record
}

pub fn user(mut record: UserRecord) -> UserRecord {
    record.id = None;
    record.created_timestamp = None;
    record.federation_link = None;
    record
}

fn clear_protocol_mapper_ids(extra: &mut Map<String, Value>) {
    if let Some(Value::Array(mappers)) = extra.get_mut("protocolMappers") {
        for mapper in mappers.iter_mut().filter_map(Value::as_object_mut) {
            mapper.remove("id");
        }
    }
}
