use std::time::Duration;

use pbkv_client::messages::{
    DataType, DtFetchReq, DtUpdateReq, MapField, RpbBucketProps,
};
use pbkv_client::{Client, ClientConfig, ClientError, Counter, DtRequest, Map, MapFieldType, Set};
use pbkv_server::{spawn_background, ServerConfig, ServerHandle};

fn setup() -> (ServerHandle, Client) {
    let server = spawn_background(ServerConfig::with_addr("127.0.0.1:0")).expect("server");
    let config = ClientConfig {
        addrs: vec![server.addr().to_string()],
        connections_per_node: 1,
        read_timeout: Some(Duration::from_secs(2)),
        ..ClientConfig::default()
    };
    let client = Client::new(config).expect("client");
    client.dial().expect("dial");

    let mut session = client.session().expect("session");
    for (bucket_type, datatype) in [("counters", "counter"), ("sets", "set"), ("maps", "map")] {
        session
            .bucket("setup")
            .with_type(bucket_type)
            .set_type_props(RpbBucketProps {
                datatype: Some(datatype.as_bytes().to_vec()),
                ..Default::default()
            })
            .expect("declare bucket type");
    }
    session.release();
    (server, client)
}

#[test]
fn counter_commit_sequence() {
    let (_server, client) = setup();
    let mut session = client.session().expect("session");
    let mut bucket = session.bucket("scores").with_type("counters");
    let mut crdt = bucket.crdt("player");

    let mut observed = Vec::new();
    crdt.new_counter().increment(1);
    crdt.commit().expect("commit");
    observed.push(crdt.counter().expect("counter").value());

    crdt.counter_mut().expect("counter").increment(5);
    crdt.commit().expect("commit");
    observed.push(crdt.counter().expect("counter").value());

    crdt.counter_mut().expect("counter").decrement(3);
    crdt.commit().expect("commit");
    observed.push(crdt.counter().expect("counter").value());
    assert_eq!(observed, vec![1, 6, 3]);

    // A fresh handle sees the same value.
    let mut again = bucket.crdt("player");
    assert_eq!(again.fetch().expect("fetch"), DataType::Counter);
    assert_eq!(again.counter().expect("counter").value(), 3);
}

#[test]
fn missing_key_fetches_empty_value() {
    let (_server, client) = setup();
    let mut session = client.session().expect("session");
    let mut bucket = session.bucket("tags").with_type("sets");
    let mut crdt = bucket.crdt("nobody");
    assert_eq!(crdt.fetch().expect("fetch"), DataType::Set);
    assert!(crdt.set().expect("set").is_empty());
    assert!(crdt.context().is_none());
}

#[test]
fn set_add_remove_and_noop_idempotence() {
    let (_server, client) = setup();
    let mut session = client.session().expect("session");
    let mut bucket = session.bucket("tags").with_type("sets");
    let mut crdt = bucket.crdt("article");

    let set = crdt.new_set();
    set.add("rust");
    set.add("kv");
    set.add("net");
    crdt.commit().expect("commit");
    assert_eq!(crdt.set().expect("set").values(), ["rust", "kv", "net"]);

    crdt.fetch().expect("fetch");
    let set = crdt.set_mut().expect("set");
    assert!(set.remove("kv"));
    assert!(!set.remove("absent"));
    crdt.commit().expect("commit");
    assert_eq!(crdt.set().expect("set").values(), ["rust", "net"]);

    // Re-adding present members changes nothing.
    crdt.fetch().expect("fetch");
    let before = crdt.set().expect("set").clone();
    let set = crdt.set_mut().expect("set");
    set.add("rust");
    set.add("net");
    crdt.commit().expect("commit");
    assert_eq!(crdt.set().expect("set").values(), before.values());
    assert!(crdt.set().expect("set").pending_adds().is_empty());
}

#[test]
fn map_round_trip_at_depth_two() {
    let (_server, client) = setup();
    let mut session = client.session().expect("session");
    let mut bucket = session.bucket("profiles").with_type("maps");
    let mut crdt = bucket.crdt("alice");

    let map = crdt.new_map();
    map.flags.insert("active".into(), true);
    map.registers.insert("name".into(), "Alice".into());
    let mut visits = Counter::new();
    visits.increment(3);
    map.counters.insert("visits".into(), visits);
    map.sets.insert("langs".into(), Set::new());
    map.sets.get_mut("langs").expect("langs").add("rust");

    let mut address = Map::new();
    address.registers.insert("city".into(), "Oslo".into());
    address.flags.insert("verified".into(), false);
    let mut geo = Map::new();
    geo.registers.insert("lat".into(), "59.9".into());
    address.maps.insert("geo".into(), geo);
    map.maps.insert("address".into(), address);

    crdt.commit().expect("commit");

    // The committing handle holds the server's answer.
    let committed = crdt.map().expect("map");
    assert!(committed.removed().is_empty());
    assert_eq!(committed.flags.get("active"), Some(&true));
    assert_eq!(committed.registers["name"], "Alice");
    assert_eq!(committed.counters["visits"].value(), 3);
    assert_eq!(committed.counters["visits"].pending(), 0);
    assert_eq!(committed.sets["langs"].values(), ["rust"]);
    assert!(committed.sets["langs"].pending_adds().is_empty());
    let address = &committed.maps["address"];
    assert_eq!(address.registers["city"], "Oslo");
    assert_eq!(address.flags.get("verified"), Some(&false));
    assert_eq!(address.maps["geo"].registers["lat"], "59.9");
    assert!(address.removed().is_empty());

    let mut reader = bucket.crdt("alice");
    assert_eq!(reader.fetch().expect("fetch"), DataType::Map);
    let map = reader.map().expect("map");
    assert_eq!(map.flags.get("active"), Some(&true));
    assert_eq!(map.registers.get("name").map(String::as_str), Some("Alice"));
    assert_eq!(map.counters["visits"].value(), 3);
    assert_eq!(map.sets["langs"].values(), ["rust"]);
    let address = &map.maps["address"];
    assert_eq!(address.registers["city"], "Oslo");
    assert_eq!(address.flags.get("verified"), Some(&false));
    assert_eq!(address.maps["geo"].registers["lat"], "59.9");
}

#[test]
fn map_removals_reach_the_server() {
    let (_server, client) = setup();
    let mut session = client.session().expect("session");
    let mut bucket = session.bucket("profiles").with_type("maps");
    let mut crdt = bucket.crdt("bob");

    let map = crdt.new_map();
    map.registers.insert("name".into(), "Bob".into());
    map.flags.insert("admin".into(), true);
    let mut inner = Map::new();
    inner.registers.insert("zip".into(), "0150".into());
    inner.registers.insert("street".into(), "Main".into());
    map.maps.insert("address".into(), inner);
    crdt.commit().expect("commit");

    crdt.fetch().expect("fetch");
    let map = crdt.map_mut().expect("map");
    map.remove(MapFieldType::Flag, "admin");
    map.maps
        .get_mut("address")
        .expect("address")
        .remove(MapFieldType::Register, "zip");
    assert_eq!(map.removed(), [MapField::new("admin", MapFieldType::Flag)]);
    crdt.commit().expect("commit");

    let map = crdt.map().expect("map");
    assert!(map.removed().is_empty());
    assert!(map.flags.is_empty());
    assert_eq!(map.registers["name"], "Bob");
    let address = &map.maps["address"];
    assert!(!address.registers.contains_key("zip"));
    assert_eq!(address.registers["street"], "Main");
}

#[test]
fn context_rides_on_next_update_then_clears() {
    let (server, client) = setup();
    let mut session = client.session().expect("session");
    let mut bucket = session.bucket("scores").with_type("counters");
    let mut crdt = bucket.crdt("ctx");

    crdt.new_counter().increment(1);
    crdt.commit().expect("first commit");

    crdt.fetch().expect("fetch");
    let context = crdt.context().expect("context").to_vec();
    crdt.counter_mut().expect("counter").increment(1);
    crdt.commit().expect("second commit");
    assert!(crdt.context().is_none());

    crdt.counter_mut().expect("counter").increment(1);
    crdt.commit().expect("third commit");

    assert_eq!(
        server.store().update_contexts(),
        vec![None, Some(context), None]
    );
}

#[test]
fn override_request_wins_over_defaults() {
    let (server, client) = setup();
    let mut session = client.session().expect("session");
    let mut bucket = session.bucket("scores").with_type("counters");
    let mut crdt = bucket.crdt("override");

    crdt.new_counter().increment(2);
    crdt.set_request(DtRequest::Update(DtUpdateReq {
        context: Some(b"caller".to_vec()),
        return_body: Some(false),
        ..Default::default()
    }));
    let resp = crdt.commit().expect("commit");
    assert_eq!(resp.counter_value, None);
    // Without a body the staged delta is folded locally.
    assert_eq!(crdt.counter().expect("counter").value(), 2);
    assert_eq!(server.store().update_contexts(), vec![Some(b"caller".to_vec())]);
}

#[test]
fn wrong_override_variant_is_usage_error() {
    let (_server, client) = setup();
    let mut session = client.session().expect("session");
    let mut bucket = session.bucket("scores").with_type("counters");

    let mut crdt = bucket
        .crdt("k")
        .with_request(DtRequest::Update(DtUpdateReq::default()));
    assert!(matches!(crdt.fetch(), Err(ClientError::Usage(_))));

    crdt.new_counter().increment(1);
    crdt.set_request(DtRequest::Fetch(DtFetchReq::default()));
    assert!(matches!(crdt.commit(), Err(ClientError::Usage(_))));
}

#[test]
fn untyped_bucket_and_empty_commit_are_usage_errors() {
    let (_server, client) = setup();
    let mut session = client.session().expect("session");

    let mut untyped = session.bucket("plain");
    let mut crdt = untyped.crdt("k");
    assert!(matches!(crdt.fetch(), Err(ClientError::Usage(_))));
    crdt.new_counter().increment(1);
    assert!(matches!(crdt.commit(), Err(ClientError::Usage(_))));

    let mut typed = session.bucket("scores").with_type("counters");
    let mut empty = typed.crdt("nothing");
    assert!(matches!(empty.commit(), Err(ClientError::Usage(_))));
}
