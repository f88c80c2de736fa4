//! End-to-end import runs against the memory store

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use variant_import::database::{ColumnDef, MemoryStore, RelationalStore, Row};
use variant_import::import::{RunState, SchemaChange, VariantImport};
use variant_import::{ImportConfig, ImportError};

const DESTINATION: &str = "pimgento_variant";
const STAGING: &str = "tmp_variant";

fn write_source(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    path
}

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .seed_attributes("eav_attribute", 4, &[("color", 12), ("size", 7)])
        .unwrap();
    // Same code under another entity type must not leak into the lookup
    store
        .seed_attributes("eav_attribute", 9, &[("color", 99)])
        .unwrap();
    store
}

fn find<'a>(rows: &'a [Row], code: &str) -> &'a Row {
    rows.iter()
        .find(|r| r.get("code") == Some(code))
        .unwrap_or_else(|| panic!("no row for {}", code))
}

mod pipeline_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_run_translates_axis_and_renames_columns() {
        let dir = TempDir::new().unwrap();
        let path = write_source(
            dir.path(),
            "variant.csv",
            &["code;axis;label_en;price", "tshirt;color,size,unknown;T-Shirt;10"],
        );
        let store = seeded_store();
        let import = VariantImport::new(&store, &ImportConfig::memory()).unwrap();

        let report = import.run(&path).await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.state, RunState::StagingDropped);
        assert!(report.outcome.continue_run);
        assert_eq!(report.outcome.message, "1 line(s) found");
        assert_eq!(report.rows_loaded, 1);
        assert_eq!(report.merge.unresolved_codes, 1);
        assert!(report.merge.axis_translated);

        assert_eq!(
            store.describe_table(DESTINATION).await.unwrap(),
            vec!["code", "axis", "name_en", "price"]
        );
        let rows = store.rows(DESTINATION).unwrap();
        let row = find(&rows, "tshirt");
        assert_eq!(row.get("axis"), Some("12,7"));
        assert_eq!(row.get("name_en"), Some("T-Shirt"));
        assert_eq!(row.get("price"), Some("10"));

        assert!(!store.table_exists(STAGING).await.unwrap());
    }

    #[tokio::test]
    async fn test_steps_are_recorded_in_order() {
        let dir = TempDir::new().unwrap();
        let path = write_source(dir.path(), "variant.csv", &["code;axis", "a;color"]);
        let store = seeded_store();
        let import = VariantImport::new(&store, &ImportConfig::memory()).unwrap();

        let report = import.run(&path).await.unwrap();
        let states: Vec<RunState> = report.steps.iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![
                RunState::StagingCreated,
                RunState::StagingLoaded,
                RunState::SchemaReconciled,
                RunState::Merged,
                RunState::StagingDropped,
            ]
        );
        assert!(report.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_reimport_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = write_source(
            dir.path(),
            "variant.csv",
            &["code;axis;label_en", "a;color;Alpha", "b;size;Beta"],
        );
        let store = seeded_store();
        let import = VariantImport::new(&store, &ImportConfig::memory()).unwrap();

        import.run(&path).await.unwrap();
        let first = store.rows(DESTINATION).unwrap();
        import.run(&path).await.unwrap();
        let second = store.rows(DESTINATION).unwrap();

        assert_eq!(second.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_existing_rows_are_updated_not_duplicated() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store();
        let import = VariantImport::new(&store, &ImportConfig::memory()).unwrap();

        let first = write_source(dir.path(), "v1.csv", &["code;axis;label_en", "a;color;Old"]);
        import.run(&first).await.unwrap();
        let second = write_source(dir.path(), "v2.csv", &["code;axis;label_en", "a;size;New"]);
        import.run(&second).await.unwrap();

        let rows = store.rows(DESTINATION).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("axis"), Some("7"));
        assert_eq!(rows[0].get("name_en"), Some("New"));
    }

    #[tokio::test]
    async fn test_family_variant_column_keeps_axis_verbatim() {
        let dir = TempDir::new().unwrap();
        let path = write_source(
            dir.path(),
            "variant.csv",
            &["code;axis;family_variant", "shirt;raw,value;clothing_color"],
        );
        let store = seeded_store();
        let import = VariantImport::new(&store, &ImportConfig::memory()).unwrap();

        let report = import.run(&path).await.unwrap();
        assert!(!report.merge.axis_translated);

        let rows = store.rows(DESTINATION).unwrap();
        let row = find(&rows, "shirt");
        assert_eq!(row.get("axis"), Some("raw,value"));
        assert_eq!(row.get("family_variant"), Some("clothing_color"));
    }

    #[tokio::test]
    async fn test_source_without_axis_column() {
        let dir = TempDir::new().unwrap();
        let path = write_source(dir.path(), "variant.csv", &["code;label_en", "a;Alpha"]);
        let store = seeded_store();
        let import = VariantImport::new(&store, &ImportConfig::memory()).unwrap();

        let report = import.run(&path).await.unwrap();
        assert!(report.schema_changes.contains(&SchemaChange::AddColumn {
            table: STAGING.to_string(),
            column: ColumnDef::varchar("axis", 255),
        }));

        let rows = store.rows(DESTINATION).unwrap();
        assert_eq!(find(&rows, "a").get("axis"), Some(""));
        assert_eq!(find(&rows, "a").get("name_en"), Some("Alpha"));
    }

    #[tokio::test]
    async fn test_rows_without_code_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = write_source(
            dir.path(),
            "variant.csv",
            &["code;axis", "a;color", ";size", "b;"],
        );
        let store = seeded_store();
        let import = VariantImport::new(&store, &ImportConfig::memory()).unwrap();

        let report = import.run(&path).await.unwrap();
        assert_eq!(report.rows_loaded, 3);
        assert_eq!(report.merge.skipped_rows, 1);
        assert_eq!(report.merge.rows_written, 2);
        assert_eq!(store.rows(DESTINATION).unwrap().len(), 2);
    }
}

mod schema_tests {
    use super::*;

    #[tokio::test]
    async fn test_rebuild_drops_columns_missing_from_source() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store();
        let columns = ["code", "axis", "legacy"].map(ColumnDef::text);
        store.create_table(DESTINATION, &columns, false).await.unwrap();

        let path = write_source(dir.path(), "variant.csv", &["code;axis;label_en", "a;color;A"]);
        let import = VariantImport::new(&store, &ImportConfig::memory()).unwrap();
        let report = import.run(&path).await.unwrap();

        assert!(report.schema_changes.contains(&SchemaChange::DropColumn {
            table: DESTINATION.to_string(),
            column: "legacy".to_string(),
        }));
        assert_eq!(
            store.describe_table(DESTINATION).await.unwrap(),
            vec!["code", "axis", "name_en"]
        );
    }

    #[tokio::test]
    async fn test_without_rebuild_schema_is_additive_only() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store();
        let columns = ["code", "axis", "legacy"].map(ColumnDef::text);
        store.create_table(DESTINATION, &columns, false).await.unwrap();

        let mut config = ImportConfig::memory();
        config.import.rebuild_schema = false;
        let import = VariantImport::new(&store, &config).unwrap();
        let path = write_source(dir.path(), "variant.csv", &["code;axis;label_en", "a;color;A"]);

        let report = import.run(&path).await.unwrap();
        assert_eq!(report.schema_changes.len(), 1);
        assert_eq!(
            store.describe_table(DESTINATION).await.unwrap(),
            vec!["code", "axis", "legacy", "name_en"]
        );

        let again = import.run(&path).await.unwrap();
        assert!(again.schema_changes.is_empty());
    }

    #[tokio::test]
    async fn test_excluded_columns_never_reach_destination() {
        let dir = TempDir::new().unwrap();
        let path = write_source(
            dir.path(),
            "variant.csv",
            &["code;axis;type;_entity_id;_is_new;price", "a;color;x;1;0;5"],
        );
        let store = seeded_store();
        let import = VariantImport::new(&store, &ImportConfig::memory()).unwrap();

        import.run(&path).await.unwrap();
        assert_eq!(
            store.describe_table(DESTINATION).await.unwrap(),
            vec!["code", "axis", "price"]
        );
    }
}

mod batching_tests {
    use super::*;

    fn many_rows(count: usize) -> Vec<String> {
        let mut lines = vec!["code;axis".to_string()];
        lines.extend((0..count).map(|i| format!("sku-{};color", i)));
        lines
    }

    #[tokio::test]
    async fn test_default_batches_of_500() {
        let dir = TempDir::new().unwrap();
        let lines = many_rows(1001);
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let path = write_source(dir.path(), "variant.csv", &refs);
        let store = seeded_store();
        let import = VariantImport::new(&store, &ImportConfig::memory()).unwrap();

        let report = import.run(&path).await.unwrap();
        assert_eq!(store.upsert_batches(), vec![500, 500, 1]);
        assert_eq!(report.merge.batches, 3);
        assert_eq!(report.merge.rows_written, 1001);
        assert_eq!(store.rows(DESTINATION).unwrap().len(), 1001);
    }

    #[tokio::test]
    async fn test_configured_batch_size() {
        let dir = TempDir::new().unwrap();
        let lines = many_rows(5);
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let path = write_source(dir.path(), "variant.csv", &refs);
        let store = seeded_store();
        let mut config = ImportConfig::memory();
        config.import.batch_size = 2;
        let import = VariantImport::new(&store, &config).unwrap();

        import.run(&path).await.unwrap();
        assert_eq!(store.upsert_batches(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_trailing_batch() {
        let dir = TempDir::new().unwrap();
        let lines = many_rows(4);
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let path = write_source(dir.path(), "variant.csv", &refs);
        let store = seeded_store();
        let mut config = ImportConfig::memory();
        config.import.batch_size = 2;
        let import = VariantImport::new(&store, &config).unwrap();

        import.run(&path).await.unwrap();
        assert_eq!(store.upsert_batches(), vec![2, 2]);
    }
}

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_aborts_without_side_effects() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.csv");
        let store = seeded_store();
        let import = VariantImport::new(&store, &ImportConfig::memory()).unwrap();

        let report = import.run(&path).await.unwrap();
        assert_eq!(report.state, RunState::Aborted);
        assert!(!report.outcome.continue_run);
        assert!(!report.outcome.status);
        assert!(report.outcome.message.contains("absent.csv"));
        assert!(!store.table_exists(STAGING).await.unwrap());
        assert!(!store.table_exists(DESTINATION).await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_file_aborts_without_side_effects() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = write_source(dir.path(), "variant.csv", &["code;axis", "a;color"]);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o000)).unwrap();
        // Privileged users bypass permission bits
        if std::fs::File::open(&path).is_ok() {
            return;
        }
        let store = seeded_store();
        let import = VariantImport::new(&store, &ImportConfig::memory()).unwrap();

        let report = import.run(&path).await.unwrap();
        assert_eq!(report.state, RunState::Aborted);
        assert!(!report.outcome.continue_run);
        assert!(!report.outcome.status);
        assert!(report.outcome.message.contains("variant.csv"));
        assert!(!store.table_exists(STAGING).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_key_column_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_source(dir.path(), "variant.csv", &["sku;axis", "a;color"]);
        let store = seeded_store();
        let import = VariantImport::new(&store, &ImportConfig::memory()).unwrap();

        let err = import.run(&path).await.unwrap_err();
        assert!(matches!(err, ImportError::InvalidHeader(_)));
        assert!(!store.table_exists(STAGING).await.unwrap());
    }

    #[tokio::test]
    async fn test_staging_dropped_after_failure() {
        let dir = TempDir::new().unwrap();
        let path = write_source(dir.path(), "variant.csv", &["code;axis", "a;color"]);
        // No attribute table: the registry load fails after staging exists
        let store = MemoryStore::new();
        let import = VariantImport::new(&store, &ImportConfig::memory()).unwrap();

        let err = import.run(&path).await.unwrap_err();
        assert!(matches!(err, ImportError::Attributes(_)));
        assert!(!store.table_exists(STAGING).await.unwrap());
    }

    #[tokio::test]
    async fn test_staging_kept_after_failure_when_configured() {
        let dir = TempDir::new().unwrap();
        let path = write_source(dir.path(), "variant.csv", &["code;axis", "a;color"]);
        let store = MemoryStore::new();
        let mut config = ImportConfig::memory();
        config.import.keep_staging_on_error = true;
        let import = VariantImport::new(&store, &config).unwrap();

        assert!(import.run(&path).await.is_err());
        assert!(store.table_exists(STAGING).await.unwrap());
        assert_eq!(store.rows(STAGING).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ragged_row_fails_with_line_number() {
        let dir = TempDir::new().unwrap();
        let path = write_source(dir.path(), "variant.csv", &["code;axis", "a;color;extra"]);
        let store = seeded_store();
        let import = VariantImport::new(&store, &ImportConfig::memory()).unwrap();

        let err = import.run(&path).await.unwrap_err();
        assert!(matches!(err, ImportError::SourceRead { .. }));
        assert!(!store.table_exists(STAGING).await.unwrap());
    }
}
