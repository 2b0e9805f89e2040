//! End-to-end loads against the in-memory engine.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use graft_core::{
    AbortSignal, EdgeRecord, Fault, GraftError, GraphData, GraphLoader, GraphSchema, LoadErrorKind,
    LoadOptions, LoadPhase, LoadProgress, MemoryEngine, ProgressLog, PropertyRecord,
};
use serde_json::json;

fn record(value: serde_json::Value) -> PropertyRecord {
    serde_json::from_value(value).unwrap()
}

fn people() -> GraphData {
    GraphData::new().with_vertices(
        "Person",
        vec![
            record(json!({"id": "p1", "name": "Alice"})),
            record(json!({"id": "p2", "name": "Bob"})),
        ],
    )
}

fn loader(engine: &MemoryEngine) -> GraphLoader {
    GraphLoader::new(Arc::new(engine.pool()))
}

fn schema() -> Arc<GraphSchema> {
    Arc::new(
        serde_json::from_value(json!({
            "vertices": {
                "Person": {"properties": {
                    "id": {"type": "string", "required": true},
                    "name": {"type": "string"}
                }}
            },
            "edges": {
                "KNOWS": {"from": "Person", "to": "Person", "properties": {"since": {"type": "integer"}}}
            }
        }))
        .unwrap(),
    )
}

#[test]
fn test_two_person_example() {
    let engine = MemoryEngine::new();
    let options = LoadOptions::new("social").batch_size(1);

    let result = loader(&engine).load_graph_data(&people(), &options).unwrap();

    assert!(result.success);
    assert!(!result.is_partial());
    assert_eq!(result.vertex_count, 2);
    assert_eq!(result.edge_count, 0);
    assert_eq!(result.vertex_types, vec!["Person"]);
    assert_eq!(engine.statements_containing("INSERT INTO"), 2);
    assert_eq!(engine.statements_containing("cypher("), 2);

    let names: Vec<_> = engine
        .vertices("social", "Person")
        .into_iter()
        .map(|v| v.properties["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("Alice"), json!("Bob")]);
    assert!(engine.staged_keys().is_empty());
    assert_eq!(engine.connections_acquired(), engine.connections_released());
}

#[test]
fn test_unresolved_edge_fails_load() {
    let engine = MemoryEngine::new();
    let data = people().with_edges("KNOWS", vec![EdgeRecord::new("p9", "p1")]);

    let result = loader(&engine)
        .load_graph_data(&data, &LoadOptions::new("social"))
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.vertex_count, 2);
    assert_eq!(result.edge_count, 0);
    assert_eq!(result.errors.len(), 1);
    let error = &result.errors[0];
    assert_eq!(error.kind, LoadErrorKind::Execution);
    assert_eq!(error.type_name.as_deref(), Some("KNOWS"));
    assert_eq!(error.record, Some(0));
    assert!(error.message.contains("p9"), "{}", error.message);

    assert_eq!(engine.vertex_count("social"), 0);
    assert_eq!(engine.edge_count("social"), 0);
}

#[test]
fn test_unresolved_edge_with_continue_keeps_resolved_edges() {
    let engine = MemoryEngine::new();
    let data = people().with_edges(
        "KNOWS",
        vec![EdgeRecord::new("p1", "p2"), EdgeRecord::new("p1", "ghost")],
    );
    let options = LoadOptions::new("social").continue_on_error(true);

    let result = loader(&engine).load_graph_data(&data, &options).unwrap();

    assert!(result.success);
    assert!(result.is_partial());
    assert_eq!(result.edge_count, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].record, Some(1));
    assert!(result.errors[0].message.contains("ghost"));
    assert_eq!(engine.edge_count("social"), 1);
}

#[test]
fn test_shared_id_across_types_still_reports_unresolved_edge() {
    let engine = MemoryEngine::new();
    let data = GraphData::new()
        .with_vertices("Person", vec![record(json!({"id": "x"})), record(json!({"id": "y"}))])
        .with_vertices("Company", vec![record(json!({"id": "x"}))])
        .with_edges(
            "KNOWS",
            vec![EdgeRecord::new("y", "x"), EdgeRecord::new("y", "missing")],
        );
    let options = LoadOptions::new("social").batch_size(10);

    let result = loader(&engine).load_graph_data(&data, &options).unwrap();

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, LoadErrorKind::Execution);
    assert_eq!(result.errors[0].record, Some(1));
    assert!(result.errors[0].message.contains("missing"), "{}", result.errors[0].message);
    assert!(
        result.warnings.iter().any(|w| w.contains("more than one vertex")),
        "{:?}",
        result.warnings
    );
    assert_eq!(engine.edge_count("social"), 0);
}

#[test]
fn test_shared_id_with_continue_warns_and_keeps_both_edges() {
    let engine = MemoryEngine::new();
    let data = GraphData::new()
        .with_vertices("Person", vec![record(json!({"id": "x"})), record(json!({"id": "y"}))])
        .with_vertices("Company", vec![record(json!({"id": "x"}))])
        .with_edges("KNOWS", vec![EdgeRecord::new("y", "x")]);
    let options = LoadOptions::new("social").continue_on_error(true);

    let result = loader(&engine).load_graph_data(&data, &options).unwrap();

    assert!(result.success);
    assert!(result.errors.is_empty());
    assert_eq!(result.edge_count, 2);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(engine.edge_count("social"), 2);
}

#[test]
fn test_open_schema_keeps_undeclared_properties() {
    let engine = MemoryEngine::new();
    let data = GraphData::new().with_vertices(
        "Person",
        vec![record(json!({"id": "p1", "name": "Alice", "email": "a@x.org"}))],
    );
    let options = LoadOptions::new("social").validate_before_load(true);

    let result = loader(&engine)
        .with_schema(schema())
        .load_graph_data(&data, &options)
        .unwrap();

    assert!(result.success, "{:?}", result.errors);
    let stored = engine.vertices("social", "Person");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].properties["email"], json!("a@x.org"));
    assert_eq!(stored[0].properties["name"], json!("Alice"));
}

#[test]
fn test_edges_resolve_declared_endpoint_types() {
    let engine = MemoryEngine::new();
    let data = people()
        .with_vertices("Company", vec![record(json!({"id": "p1", "name": "Acme"}))])
        .with_edges(
            "KNOWS",
            vec![EdgeRecord::new("p1", "p2").with_property("since", 2020i64)],
        );

    let result = loader(&engine)
        .with_schema(schema())
        .load_graph_data(&data, &LoadOptions::new("social"))
        .unwrap();

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.edge_count, 1);

    let people = engine.vertices("social", "Person");
    let edges = engine.edges("social", "KNOWS");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].from, people[0].id);
    assert_eq!(edges[0].to, people[1].id);
    assert_eq!(edges[0].properties["since"], json!(2020));
}

#[test]
fn test_failing_batch_leaves_nothing_behind() {
    let engine = MemoryEngine::new();
    engine.inject(Fault::statement_containing("CREATE (v:Person").after(1));
    let options = LoadOptions::new("social").batch_size(1);

    let result = loader(&engine).load_graph_data(&people(), &options).unwrap();

    assert!(!result.success);
    assert_eq!(result.vertex_count, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, LoadErrorKind::Execution);
    assert_eq!(result.errors[0].batch, Some(1));

    assert_eq!(engine.vertex_count("social"), 0);
    assert!(engine.staged_keys().is_empty());
    assert_eq!(engine.open_connections(), 0);
}

#[test]
fn test_failing_batch_with_continue_is_skipped() {
    let engine = MemoryEngine::new();
    engine.inject(Fault::statement_containing("CREATE (v:Person").after(1).times(1));
    let data = people().with_vertices("Person", vec![record(json!({"id": "p3"}))]);
    let options = LoadOptions::new("social").batch_size(1).continue_on_error(true);

    let result = loader(&engine).load_graph_data(&data, &options).unwrap();

    assert!(result.success);
    assert!(result.is_partial());
    assert_eq!(result.vertex_count, 2);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(engine.vertex_count("social"), 2);
    assert_eq!(engine.statements_containing("SAVEPOINT graft_batch"), 7);
}

#[test]
fn test_staging_failure_is_reported_with_key() {
    let engine = MemoryEngine::new();
    engine.inject(Fault::statement_containing("INSERT INTO").with_message("disk full"));

    let result = loader(&engine)
        .load_graph_data(&people(), &LoadOptions::new("social"))
        .unwrap();

    assert!(!result.success);
    let error = result.first_error(LoadErrorKind::Staging).unwrap();
    assert!(error.message.contains("_Person_0"), "{}", error.message);
    assert!(error.message.contains("disk full"));
}

#[test]
fn test_malformed_record_with_continue_is_skipped() {
    let engine = MemoryEngine::new();
    let data = GraphData::new().with_vertices(
        "Person",
        vec![
            record(json!({"id": "p1"})),
            record(json!({"name": "nameless"})),
            record(json!({"id": "p3"})),
        ],
    );
    let options = LoadOptions::new("social")
        .validate_before_load(true)
        .continue_on_error(true);

    let result = loader(&engine)
        .with_schema(schema())
        .load_graph_data(&data, &options)
        .unwrap();

    assert!(result.success);
    assert!(result.is_partial());
    assert_eq!(result.vertex_count, 2);
    assert_eq!(result.skipped_records, 1);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.errors.is_empty());
}

#[test]
fn test_malformed_record_without_continue_stops_before_transaction() {
    let engine = MemoryEngine::new();
    let data = GraphData::new().with_vertices("Person", vec![record(json!({"id": 7}))]);
    let options = LoadOptions::new("social").validate_before_load(true);

    let result = loader(&engine)
        .with_schema(schema())
        .load_graph_data(&data, &options)
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, LoadErrorKind::Validation);
    assert_eq!(result.errors[0].record, Some(0));
    assert_eq!(engine.connections_acquired(), 0);
}

#[test]
fn test_edge_to_skipped_vertex_is_skipped() {
    let engine = MemoryEngine::new();
    let data = GraphData::new()
        .with_vertices(
            "Person",
            vec![record(json!({"id": "p1"})), record(json!({"id": "p2", "name": 5}))],
        )
        .with_edges(
            "KNOWS",
            vec![EdgeRecord::new("p1", "p2"), EdgeRecord::new("p1", "p1")],
        );
    let options = LoadOptions::new("social")
        .validate_before_load(true)
        .continue_on_error(true);

    let result = loader(&engine)
        .with_schema(schema())
        .load_graph_data(&data, &options)
        .unwrap();

    assert!(result.success);
    assert_eq!(result.skipped_records, 2);
    assert_eq!(result.vertex_count, 1);
    assert_eq!(result.edge_count, 1);
    assert!(result.errors.is_empty());
}

#[test]
fn test_progress_is_monotonic_and_bounded() {
    let engine = MemoryEngine::new();
    let log = ProgressLog::new();
    let data = people()
        .with_vertices("Person", vec![record(json!({"id": "p3"}))])
        .with_edges(
            "KNOWS",
            vec![EdgeRecord::new("p1", "p2"), EdgeRecord::new("p2", "p3")],
        );
    let options = LoadOptions::new("social")
        .batch_size(1)
        .progress(Arc::new(log.clone()));

    let result = loader(&engine).load_graph_data(&data, &options).unwrap();
    assert!(result.success);

    let events = log.events();
    assert_eq!(events.first().map(|e| e.phase), Some(LoadPhase::Validation));
    assert_eq!((events[0].processed, events[0].total), (0, 5));
    assert_eq!(events.last().map(|e| e.phase), Some(LoadPhase::Cleanup));
    assert!(events.windows(2).all(|w| w[0].percentage <= w[1].percentage));

    let batches: Vec<&LoadProgress> = events
        .iter()
        .filter(|e| matches!(e.phase, LoadPhase::Vertices | LoadPhase::Edges))
        .collect();
    assert_eq!(batches.len(), 5);
    assert!(batches.windows(2).all(|w| w[0].processed <= w[1].processed));
    assert!(events.iter().all(|e| (0.0..=100.0).contains(&e.percentage)));

    let last = batches[batches.len() - 1];
    assert_eq!((last.processed, last.total), (5, 5));
    assert_eq!((last.batch_number, last.total_batches), (2, 2));
    assert_eq!(last.current_type.as_deref(), Some("KNOWS"));
}

#[test]
fn test_panicking_progress_sink_does_not_fail_load() {
    let engine = MemoryEngine::new();
    let options = LoadOptions::new("social").progress(Arc::new(|_: &LoadProgress| {
        panic!("sink failure");
    }));

    let result = loader(&engine).load_graph_data(&people(), &options).unwrap();

    assert!(result.success);
    assert_eq!(engine.vertex_count("social"), 2);
}

#[test]
fn test_abort_signal_cancels_between_batches() {
    let engine = MemoryEngine::new();
    let signal = AbortSignal::new();
    let trigger = signal.clone();
    let options = LoadOptions::new("social")
        .batch_size(1)
        .abort_signal(signal)
        .progress(Arc::new(move |p: &LoadProgress| {
            if p.phase == LoadPhase::Vertices {
                trigger.abort();
            }
        }));

    let result = loader(&engine).load_graph_data(&people(), &options).unwrap();

    assert!(!result.success);
    assert_eq!(result.vertex_count, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, LoadErrorKind::Cancelled);
    assert_eq!(engine.vertex_count("social"), 0);
}

#[test]
fn test_timeout_rolls_back() {
    let engine = MemoryEngine::new();
    let options = LoadOptions::new("social").transaction_timeout(Duration::ZERO);

    let result = loader(&engine).load_graph_data(&people(), &options).unwrap();

    assert!(!result.success);
    assert_eq!(result.errors[0].kind, LoadErrorKind::Timeout);
    assert_eq!(engine.vertex_count("social"), 0);
    assert_eq!(engine.open_connections(), 0);
}

#[test]
fn test_connection_fault_aborts_even_with_continue() {
    let engine = MemoryEngine::new();
    engine.inject(Fault::connection_lost_on("CREATE (v:Person"));
    let options = LoadOptions::new("social").continue_on_error(true);

    let result = loader(&engine).load_graph_data(&people(), &options).unwrap();

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, LoadErrorKind::Transaction);
    assert_eq!(engine.vertex_count("social"), 0);
    assert_eq!(engine.connections_acquired(), engine.connections_released());
    assert_eq!(engine.open_connections(), 0);
}

#[test]
fn test_commit_failure_is_reported() {
    let engine = MemoryEngine::new();
    engine.inject(Fault::commit().times(1));

    let result = loader(&engine)
        .load_graph_data(&people(), &LoadOptions::new("social"))
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.errors[0].kind, LoadErrorKind::Transaction);
    assert_eq!(result.vertex_count, 2);
    assert_eq!(engine.vertex_count("social"), 0);
}

#[test]
fn test_caller_transaction_and_double_commit() {
    let engine = MemoryEngine::new();
    let loader = loader(&engine);
    let options = LoadOptions::new("social");

    let mut tx = loader.coordinator(&options).begin().unwrap();
    let result = loader.load_graph_data_in(&mut tx, &people(), &options).unwrap();
    assert!(result.success);
    assert_eq!(engine.vertex_count("social"), 0);

    tx.commit().unwrap();
    assert_eq!(engine.vertex_count("social"), 2);
    assert!(engine.staged_keys().is_empty());

    let err = tx.commit().unwrap_err();
    assert!(matches!(err, GraftError::TransactionMisuse(_)));
    assert_eq!(engine.vertex_count("social"), 2);

    let err = loader
        .load_graph_data_in(&mut tx, &people(), &options)
        .unwrap_err();
    assert!(matches!(err, GraftError::TransactionMisuse(_)));
}

#[test]
fn test_with_transaction_makes_loads_atomic() {
    let engine = MemoryEngine::new();
    let loader = loader(&engine);
    let options = LoadOptions::new("social");
    let edges = GraphData::new().with_edges("KNOWS", vec![EdgeRecord::new("p1", "p2")]);

    let outcome: Result<(), GraftError> = loader.with_transaction(|tx| {
        let first = loader.load_graph_data_in(tx, &people(), &options)?;
        assert!(first.success);
        let second = loader.load_graph_data_in(tx, &edges, &options)?;
        assert_eq!(second.edge_count, 1);
        Err(GraftError::Cancelled)
    });
    assert!(matches!(outcome, Err(GraftError::Cancelled)));
    assert_eq!(engine.vertex_count("social"), 0);

    loader
        .with_transaction(|tx| {
            loader.load_graph_data_in(tx, &people(), &options)?;
            loader.load_graph_data_in(tx, &edges, &options)?;
            Ok(())
        })
        .unwrap();
    assert_eq!(engine.vertex_count("social"), 2);
    assert_eq!(engine.edge_count("social"), 1);
}

#[test]
fn test_load_vertices_and_edges_separately() {
    let engine = MemoryEngine::new();
    let loader = loader(&engine);
    let options = LoadOptions::new("social");

    let vertices = loader
        .load_vertices(
            "Person",
            &[record(json!({"id": "a"})), record(json!({"id": "b"}))],
            &options,
        )
        .unwrap();
    assert_eq!(vertices.vertex_count, 2);

    let edges = loader
        .load_edges("KNOWS", &[EdgeRecord::new("a", "b")], &options)
        .unwrap();
    assert!(edges.success);
    assert_eq!(edges.edge_types, vec!["KNOWS"]);
    assert_eq!(engine.edge_count("social"), 1);
}

#[test]
fn test_keep_staging_when_cleanup_disabled() {
    let engine = MemoryEngine::new();
    let options = LoadOptions::new("social").cleanup_staging(false);

    let result = loader(&engine).load_graph_data(&people(), &options).unwrap();

    let keys = engine.staged_keys();
    assert_eq!(keys.len(), 1);
    let expected = format!("graft_{}_Person_0", result.load_id.replace('-', ""));
    assert_eq!(keys[0], expected);
}

#[test]
fn test_each_load_stages_under_its_own_prefix() {
    let engine = MemoryEngine::new();
    let loader = loader(&engine);
    let options = LoadOptions::new("social").batch_size(1).cleanup_staging(false);

    let first = loader.load_graph_data(&people(), &options).unwrap();
    let second = loader.load_graph_data(&people(), &options).unwrap();

    assert_ne!(first.load_id, second.load_id);
    let keys = engine.staged_keys();
    assert_eq!(keys.len(), 4);
    for result in [&first, &second] {
        let prefix = format!("graft_{}_", result.load_id.replace('-', ""));
        assert_eq!(keys.iter().filter(|k| k.starts_with(&prefix)).count(), 2);
    }
    assert_eq!(engine.vertex_count("social"), 4);
}

#[test]
fn test_programmer_errors_are_err() {
    let engine = MemoryEngine::new();
    let loader = loader(&engine);

    let err = loader
        .load_graph_data(&people(), &LoadOptions::new("social").batch_size(0))
        .unwrap_err();
    assert!(matches!(err, GraftError::InvalidConfiguration { .. }));

    let err = loader
        .load_graph_data(&people(), &LoadOptions::new("no graph"))
        .unwrap_err();
    assert!(matches!(err, GraftError::InvalidConfiguration { .. }));
    assert_eq!(engine.connections_acquired(), 0);
}

#[test]
fn test_load_from_json_file() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        r#"{{"vertices": {{"City": [{{"id": "c1"}}, {{"id": "c2"}}]}},
            "edges": {{"ROAD": [{{"from": "c1", "to": "c2", "km": 12}}]}}}}"#
    )
    .unwrap();

    let data = GraphData::from_path(file.path()).unwrap();
    let engine = MemoryEngine::new();
    let result = loader(&engine)
        .load_graph_data(&data, &LoadOptions::new("roads"))
        .unwrap();

    assert!(result.success);
    assert_eq!((result.vertex_count, result.edge_count), (2, 1));
    assert_eq!(engine.edges("roads", "ROAD")[0].properties["km"], json!(12));
}
