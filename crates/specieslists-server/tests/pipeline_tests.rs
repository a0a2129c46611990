//! End-to-end ingestion, matching, indexing and deletion

mod common;

use common::{admin, TestEnvironment};
use specieslists_server::db::CanonicalStore;
use specieslists_server::features::lists::commands::{self as list_commands, DeleteListCommand, IngestCommand};
use specieslists_server::features::lists::queries::{self as list_queries, GetListError, GetListQuery};
use specieslists_server::features::search::queries::records::{self, SearchRecordsQuery};
use specieslists_server::ingest::{IngestOptions, Upload, ValidationWarning};
use specieslists_server::models::TaxonColumn;
use specieslists_server::search::{CallerContext, Filter, RecordSearch};

fn in_list(list_id: uuid::Uuid) -> SearchRecordsQuery {
    SearchRecordsQuery {
        search: RecordSearch {
            filters: vec![Filter::new("speciesListID", list_id.to_string())],
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn test_single_row_round_trip() {
    let env = TestEnvironment::start();
    env.resolver.accept("Vulpes vulpes", "urn:lsid:fox", "Animalia");

    let command = list_commands::CreateListCommand {
        metadata: specieslists_server::models::ListMetadata::new(
            "Foxes",
            specieslists_server::models::ListType::LocalList,
        ),
        upload: Upload::new("foxes.csv", "scientificName,kingdom,note\nVulpes vulpes,Animalia,x\n"),
    };
    let response = list_commands::create::handle(&env.state, &CallerContext::user("alice"), command)
        .await
        .unwrap();

    assert_eq!(response.job.field_list, vec!["note".to_string()]);
    assert_eq!(response.job.row_count, 1);
    assert!(response.job.validation_warnings.is_empty());

    let summary = response.indexing.expect("indexing scheduled").wait().await.unwrap();
    assert_eq!(summary.records_indexed, 1);

    let list_id = response.list.id;
    let records = env.store.records_page(list_id, 0, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.taxon.get(TaxonColumn::ScientificName), Some("Vulpes vulpes"));
    assert_eq!(record.taxon.get(TaxonColumn::Kingdom), Some("Animalia"));
    assert_eq!(record.property("note"), Some("x"));
    assert_eq!(record.properties.len(), 1);

    let stored = env.store.get_list(list_id).await.unwrap().unwrap();
    assert_eq!(stored.row_count, 1);
    assert_eq!(stored.distinct_match_count, 1);

    let hits = records::handle(&env.state, &CallerContext::anonymous(), in_list(list_id))
        .await
        .unwrap();
    assert_eq!(hits.pagination.total, 1);
    let classification = hits.items[0].document.classification.as_ref().unwrap();
    assert_eq!(classification.taxon_concept_id.as_deref(), Some("urn:lsid:fox"));
}

#[tokio::test]
async fn test_lone_row_without_name_warns() {
    let env = TestEnvironment::start();
    let command = IngestCommand {
        list_id: None,
        upload: Upload::new("notes.csv", "scientificName,note\n,orphan\n"),
        options: IngestOptions::dry_run(),
    };

    let response = list_commands::ingest::handle(&env.state, &CallerContext::user("alice"), command)
        .await
        .unwrap();

    assert_eq!(response.job.unmatched_count, 1);
    assert_eq!(
        response.job.validation_warnings,
        vec![ValidationWarning::AllRecordsWithoutScientificName]
    );
    assert!(response.list.is_none());
    assert_eq!(env.store.count_lists().await.unwrap(), 0);
}

#[tokio::test]
async fn test_messy_headers_become_properties() {
    let env = TestEnvironment::start();
    let list = env
        .create_list(
            "alice",
            "Weeds",
            false,
            "Scientific Name,Common Name,  Status (NSW)  ,Notes\nLantana camara,Lantana,Declared,spreads\n",
        )
        .await;

    let records = env.store.records_page(list.id, 0, 10).await.unwrap();
    assert_eq!(records[0].taxon.get(TaxonColumn::ScientificName), Some("Lantana camara"));
    assert_eq!(records[0].taxon.get(TaxonColumn::VernacularName), Some("Lantana"));
    assert_eq!(records[0].property("Status_NSW"), Some("Declared"));

    let stored = env.store.get_list(list.id).await.unwrap().unwrap();
    assert_eq!(stored.field_list, vec!["Status_NSW".to_string(), "Notes".to_string()]);
    assert_eq!(stored.facet_list, stored.field_list);
}

#[tokio::test]
async fn test_deleted_list_disappears_everywhere() {
    let env = TestEnvironment::start();
    let list = env
        .create_list(
            "alice",
            "Garden birds",
            false,
            "scientificName\nPica pica\nCorvus corax\nTurdus merula\n",
        )
        .await;

    let before = records::handle(&env.state, &CallerContext::anonymous(), in_list(list.id))
        .await
        .unwrap();
    assert_eq!(before.pagination.total, 3);

    let response = list_commands::delete::handle(
        &env.state,
        &CallerContext::user("alice"),
        DeleteListCommand { list_id: list.id },
    )
    .await
    .unwrap();
    assert!(response.deleted);

    let after = records::handle(&env.state, &admin(), in_list(list.id)).await.unwrap();
    assert_eq!(after.pagination.total, 0);
    assert!(env.store.records_page(list.id, 0, 10).await.unwrap().is_empty());

    let lookup = list_queries::get::handle(&env.state, &admin(), GetListQuery { list_id: list.id }).await;
    assert!(matches!(lookup, Err(GetListError::NotFound(_))));
}

#[tokio::test]
async fn test_reingest_replaces_records() {
    let env = TestEnvironment::start();
    let list = env
        .create_list("alice", "Frogs", false, "scientificName\nLitoria aurea\nLitoria peronii\n")
        .await;

    let response = list_commands::reingest::handle(
        &env.state,
        &CallerContext::user("alice"),
        list_commands::ReingestCommand {
            list_id: list.id,
            upload: Upload::new("frogs.csv", "scientificName,call\nCrinia signifera,crick\n"),
        },
    )
    .await
    .unwrap();
    assert_eq!(response.records_removed, 2);
    if let Some(indexing) = response.indexing {
        indexing.wait().await.unwrap();
    }

    let records = env.store.records_page(list.id, 0, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].property("call"), Some("crick"));

    let hits = records::handle(&env.state, &CallerContext::anonymous(), in_list(list.id))
        .await
        .unwrap();
    assert_eq!(hits.pagination.total, 1);
}

#[tokio::test]
async fn test_rematch_picks_up_new_names() {
    use specieslists_server::features::jobs::{self, RematchCommand, RematchError};

    let env = TestEnvironment::start();
    let list = env
        .create_list("alice", "Orchids", false, "scientificName\nCaladenia tutelata\n")
        .await;
    let stored = env.store.get_list(list.id).await.unwrap().unwrap();
    assert_eq!(stored.distinct_match_count, 0);

    env.resolver.accept("Caladenia tutelata", "urn:lsid:orchid", "Plantae");

    let denied = jobs::commands::rematch::handle(
        &env.state,
        &CallerContext::user("alice"),
        RematchCommand { list_id: None },
    )
    .await;
    assert!(matches!(denied, Err(RematchError::Permission(_))));

    let accepted = jobs::commands::rematch::handle(
        &env.state,
        &CallerContext::user("alice"),
        RematchCommand { list_id: Some(list.id) },
    )
    .await
    .unwrap();
    let summary = accepted.handle.wait().await.unwrap();
    assert_eq!(summary.distinct_matches, 1);

    let hits = records::handle(
        &env.state,
        &CallerContext::anonymous(),
        SearchRecordsQuery {
            search: RecordSearch {
                filters: vec![Filter::new("matchedConceptID", "urn:lsid:orchid")],
                ..Default::default()
            },
        },
    )
    .await
    .unwrap();
    assert_eq!(hits.pagination.total, 1);
}
