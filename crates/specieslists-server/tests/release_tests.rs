//! Versioned CSV releases through the list commands

mod common;

use common::TestEnvironment;
use specieslists_common::checksum::verify_sha256;
use specieslists_server::features::lists::commands::{self as list_commands, ReleaseListCommand, UpsertRecordCommand};
use specieslists_server::features::lists::queries::{self as list_queries, ListReleasesQuery};
use specieslists_server::models::{Property, TaxonColumn, TaxonFields};
use specieslists_server::search::CallerContext;

const FROGS: &str = "scientificName,call\nLitoria aurea,whistle\nCrinia signifera,crick\n";

fn release(list_id: uuid::Uuid, force: bool) -> ReleaseListCommand {
    ReleaseListCommand { list_id, force }
}

#[tokio::test]
async fn test_repeat_release_returns_same_release() {
    let env = TestEnvironment::start();
    let list = env.create_list("alice", "Frogs", false, FROGS).await;
    let alice = CallerContext::user("alice");

    let first = list_commands::release::handle(&env.state, &alice, release(list.id, false))
        .await
        .unwrap();
    let second = list_commands::release::handle(&env.state, &alice, release(list.id, false))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.row_count, 2);

    let releases = list_queries::releases::handle(&env.state, &alice, ListReleasesQuery { list_id: list.id })
        .await
        .unwrap();
    assert_eq!(releases.len(), 1);
}

#[tokio::test]
async fn test_release_file_contents() {
    let env = TestEnvironment::start();
    let list = env.create_list("alice", "Frogs", false, FROGS).await;

    let released = list_commands::release::handle(&env.state, &CallerContext::user("alice"), release(list.id, false))
        .await
        .unwrap();

    let bytes = std::fs::read(&released.location).unwrap();
    assert_eq!(released.size_bytes, bytes.len() as i64);
    verify_sha256(&bytes, &released.checksum).unwrap();

    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let headers = reader.headers().unwrap().clone();
    assert_eq!(&headers[0], "id");
    assert!(headers.iter().any(|h| h == "scientificName"));
    assert_eq!(headers.iter().last(), Some("call"));

    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 2);
    let calls: Vec<&str> = rows.iter().map(|row| &row[headers.len() - 1]).collect();
    assert!(calls.contains(&"whistle"));
    assert!(calls.contains(&"crick"));
}

#[tokio::test]
async fn test_edit_produces_new_release() {
    let env = TestEnvironment::start();
    let list = env.create_list("alice", "Frogs", false, FROGS).await;
    let alice = CallerContext::user("alice");

    let before = list_commands::release::handle(&env.state, &alice, release(list.id, false))
        .await
        .unwrap();

    let mut taxon = TaxonFields::default();
    taxon.set(TaxonColumn::ScientificName, "Limnodynastes peronii");
    list_commands::upsert_record::handle(
        &env.state,
        &alice,
        UpsertRecordCommand {
            list_id: list.id,
            record_id: None,
            taxon,
            properties: vec![Property::new("call", "tok")],
        },
    )
    .await
    .unwrap();

    let after = list_commands::release::handle(&env.state, &alice, release(list.id, false))
        .await
        .unwrap();
    assert_ne!(before.id, after.id);
    assert!(after.released_version > before.released_version);
    assert_eq!(after.row_count, 3);

    let releases = list_queries::releases::handle(&env.state, &alice, ListReleasesQuery { list_id: list.id })
        .await
        .unwrap();
    assert_eq!(releases[0].id, after.id);
    assert_eq!(releases[1].id, before.id);
}

#[tokio::test]
async fn test_forced_release_writes_again() {
    let env = TestEnvironment::start();
    let list = env.create_list("alice", "Frogs", false, FROGS).await;
    let alice = CallerContext::user("alice");

    let first = list_commands::release::handle(&env.state, &alice, release(list.id, false))
        .await
        .unwrap();
    let forced = list_commands::release::handle(&env.state, &alice, release(list.id, true))
        .await
        .unwrap();

    assert_ne!(first.id, forced.id);
    assert_eq!(first.released_version, forced.released_version);
    assert_eq!(first.checksum, forced.checksum);
}
