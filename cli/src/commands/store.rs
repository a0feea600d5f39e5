//! One-shot commands against a store: `get`, `set` and `list`.
use serde_json::Value;
use statekeep_core::api::{Storage, StorageFile, StorageSpec};

use crate::commands::cli::{GetArgs, SetArgs};
use crate::error::CliError;

/// Exit code of `get` when the component has no stored state.
pub const EXIT_NOT_FOUND: i32 = 1;

pub async fn handle_get(storage: &Storage, args: GetArgs) -> Result<i32, CliError> {
    let Some(value) = storage.get_state::<Value>(&args.component, None).await? else {
        eprintln!("no state recorded for component '{}'", args.component);
        return Ok(EXIT_NOT_FOUND);
    };
    let text = if args.pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .map_err(|e| CliError::Command(format!("failed to render state: {e}")))?;
    println!("{text}");
    Ok(0)
}

pub async fn handle_set(storage: &Storage, args: SetArgs) -> Result<i32, CliError> {
    let value: Value = serde_json::from_str(&args.json)
        .map_err(|e| CliError::Command(format!("invalid JSON for '{}': {e}", args.component)))?;
    let spec = args.file.map(StorageSpec::new);

    let written = set_component(storage, &args.component, &value, spec.as_ref()).await?;
    if written.is_empty() {
        println!("{}: unchanged", args.component);
    }
    for unit in written {
        println!("wrote {}", storage.macros().collapse(&unit.path));
    }
    Ok(0)
}

pub async fn handle_list(storage: &Storage) -> Result<i32, CliError> {
    for name in storage.component_names().await? {
        println!("{name}");
    }
    Ok(0)
}

/// Runs one full save cycle for a single component and returns the units
/// it wrote.
pub async fn set_component(
    storage: &Storage,
    component: &str,
    value: &Value,
    spec: Option<&StorageSpec>,
) -> Result<Vec<StorageFile>, CliError> {
    let mut session = storage.start_externalization().await;
    session.set_state(component, value, spec)?;

    let mut save = storage.start_save(session)?;
    save.save().await?;
    let written = save.written_files().to_vec();
    storage.finish_save(save)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> Storage {
        Storage::builder("cli").root(dir.path()).build().unwrap()
    }

    #[tokio::test]
    async fn set_then_get() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let written = set_component(&storage, "Foo", &json!({"x": 1}), None)
            .await
            .unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].path, dir.path().join("state.json"));
        assert_eq!(
            storage.macros().collapse(&written[0].path),
            "$ROOT$/state.json"
        );

        let again = set_component(&storage, "Foo", &json!({"x": 1}), None)
            .await
            .unwrap();
        assert!(again.is_empty());

        let value: Value = storage.get_state("Foo", None).await.unwrap().unwrap();
        assert_eq!(value, json!({"x": 1}));
    }

    #[tokio::test]
    async fn get_missing_component_exits_not_found() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let code = handle_get(
            &storage,
            GetArgs {
                component: "Nobody".into(),
                pretty: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(code, EXIT_NOT_FOUND);
    }

    #[tokio::test]
    async fn set_rejects_invalid_json() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let err = handle_set(
            &storage,
            SetArgs {
                component: "Foo".into(),
                json: "{not json".into(),
                file: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CliError::Command(_)));
    }
}
