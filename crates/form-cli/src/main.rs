mod session;

use clap::{Parser, Subcommand, ValueEnum};
use form_spec::{
    AutosaveOutcome, Field, FieldType, FieldUpdate, FormValues, VisibilityMode, builtin_templates,
    export_json, export_schema, find_template, resolve_visibility, template_schema,
    validate_values,
};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use session::Session;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const LOG_ENV: &str = "FORM_BUILDER_LOG";

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Command line form builder",
    long_about = "Edits a form document stored in a local session directory; every change is autosaved unless autosave is off"
)]
struct Cli {
    /// Session directory (defaults to FORM_BUILDER_DATA_DIR or ./.form-builder).
    #[arg(long, global = true, value_name = "DIR")]
    dir: Option<PathBuf>,
    /// Log debug output to stderr.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Subcommand)]
enum Command {
    /// Add a field with type defaults.
    Add {
        /// Field type, e.g. text, email, multi-select, submit.
        #[arg(value_name = "TYPE")]
        kind: FieldType,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        placeholder: Option<String>,
        #[arg(long)]
        required: bool,
        /// Comma separated choices for select, radio and multi-select.
        #[arg(long, value_delimiter = ',')]
        options: Option<Vec<String>>,
    },
    /// Apply a partial update to a field.
    Update {
        id: String,
        /// JSON object of keys to replace; null clears a key.
        #[arg(long, value_name = "JSON")]
        set: Option<String>,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        placeholder: Option<String>,
        #[arg(long, value_name = "BOOL")]
        required: Option<bool>,
    },
    /// Remove a field.
    Remove { id: String },
    /// Copy a field right after the original.
    Duplicate { id: String },
    /// Move the field at FROM to TO (0-based).
    Move { from: usize, to: usize },
    /// Rename the form.
    Title { title: String },
    /// List the fields of the working document.
    List,
    /// Write the document as export JSON.
    Export {
        /// Output file; stdout when omitted.
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
    /// Replace the document with an export file.
    Import {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// List the built-in templates.
    Templates,
    /// Replace the document with a built-in template.
    Template { id: String },
    /// Save the document; a name creates a new saved form.
    Save {
        #[arg(long)]
        name: Option<String>,
    },
    /// List saved forms, newest first.
    Saves,
    /// Load a saved form.
    Load { id: String },
    /// Delete a saved form.
    Delete { id: String },
    /// Empty the document.
    Clear,
    /// Start a fresh, unsaved document.
    New,
    /// Show which fields are visible for the given values and validate them.
    Preview {
        /// JSON object of values keyed by field id.
        #[arg(long, value_name = "JSON")]
        values: Option<String>,
        /// Read values from a JSON file instead.
        #[arg(long, value_name = "PATH", conflicts_with = "values")]
        values_file: Option<PathBuf>,
    },
    /// Print the JSON Schema of the export format.
    Schema {
        /// Print the schema of a form template instead.
        #[arg(long)]
        template: bool,
    },
    /// Turn autosave on or off.
    Autosave {
        #[arg(value_enum)]
        state: Toggle,
    },
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Command::Schema { template } = cli.command {
        let schema = if template {
            template_schema()
        } else {
            export_schema()
        };
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }
    if let Command::Templates = cli.command {
        return run_templates();
    }

    let mut session = Session::open(session::resolve_data_dir(cli.dir))?;
    match cli.command {
        Command::Add {
            kind,
            label,
            placeholder,
            required,
            options,
        } => run_add(&mut session, kind, label, placeholder, required, options)?,
        Command::Update {
            id,
            set,
            label,
            placeholder,
            required,
        } => run_update(&mut session, &id, set, label, placeholder, required)?,
        Command::Remove { id } => require(session.store.remove_field(&id), "no field", &id)?,
        Command::Duplicate { id } => match session.store.duplicate_field(&id) {
            Some(copy) => println!("{copy}"),
            None => return Err(format!("field '{id}' cannot be duplicated").into()),
        },
        Command::Move { from, to } => {
            if !session.store.reorder_fields(from, to) {
                return Err(format!("cannot move field {from} to {to}").into());
            }
        }
        Command::Title { title } => {
            session.store.set_form_title(title);
        }
        Command::List => run_list(&session),
        Command::Export { out } => run_export(&session, out)?,
        Command::Import { path } => {
            let contents = fs::read_to_string(&path)?;
            session.store.import_json(&contents)?;
        }
        Command::Template { id } => {
            let template = find_template(&id)?;
            session.store.load_template(&template)?;
        }
        Command::Save { name } => {
            let saved = session
                .persistence
                .save_form(&mut session.store, name.as_deref())?;
            println!("{}", saved.id);
        }
        Command::Saves => run_saves(&session),
        Command::Load { id } => {
            let loaded = session
                .persistence
                .load_saved_form(&id, &mut session.store)?;
            require(loaded, "no saved form", &id)?;
        }
        Command::Delete { id } => {
            let deleted = session
                .persistence
                .delete_saved_form(&id, &mut session.store)?;
            require(deleted, "no saved form", &id)?;
        }
        Command::Clear => {
            session.store.clear_form();
        }
        Command::New => session.start_new()?,
        Command::Preview {
            values,
            values_file,
        } => run_preview(&session, values, values_file)?,
        Command::Autosave { state } => {
            session.set_autosave(state == Toggle::On)?;
            println!(
                "autosave {} ({})",
                if session.config().autosave_enabled {
                    "on"
                } else {
                    "off"
                },
                session.dir().display()
            );
        }
        Command::Schema { .. } | Command::Templates => {}
    }

    if let Some(AutosaveOutcome::Skipped(reason)) = session.finish()? {
        tracing::debug!(?reason, "autosave skipped");
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn require(applied: bool, what: &str, id: &str) -> CliResult<()> {
    if applied {
        Ok(())
    } else {
        Err(format!("{what} '{id}'").into())
    }
}

fn run_add(
    session: &mut Session,
    kind: FieldType,
    label: Option<String>,
    placeholder: Option<String>,
    required: bool,
    options: Option<Vec<String>>,
) -> CliResult<()> {
    let mut field = match label {
        Some(label) => Field::labelled(kind, label),
        None => Field::new(kind),
    };
    if placeholder.is_some() {
        field.placeholder = placeholder;
    }
    field.required = required;
    if let Some(options) = options {
        if !kind.has_options() {
            return Err(format!("{kind} fields do not take options").into());
        }
        field.options = Some(options);
    }
    let id = field.id.clone();
    session.store.add_field(field);
    println!("{id}");
    Ok(())
}

fn run_update(
    session: &mut Session,
    id: &str,
    set: Option<String>,
    label: Option<String>,
    placeholder: Option<String>,
    required: Option<bool>,
) -> CliResult<()> {
    let mut updates: FieldUpdate = match set {
        Some(json) => serde_json::from_str(&json)?,
        None => FieldUpdate::default(),
    };
    if label.is_some() {
        updates.label = label;
    }
    if let Some(placeholder) = placeholder {
        updates.placeholder = Some(Some(placeholder));
    }
    if required.is_some() {
        updates.required = required;
    }
    if updates.is_empty() {
        return Err("nothing to update".into());
    }
    require(session.store.update_field(id, updates), "no field", id)
}

fn run_list(session: &Session) {
    let state = session.store.state();
    println!(
        "{}{}",
        state.title(),
        if state.is_dirty() { " (unsaved)" } else { "" }
    );
    for (index, field) in state.fields().iter().enumerate() {
        let required = if field.required { " *" } else { "" };
        println!("{index}\t{}\t{}\t{}{required}", field.id, field.kind, field.label);
    }
}

fn run_export(session: &Session, out: Option<PathBuf>) -> CliResult<()> {
    let json = export_json(&session.store.export_form())?;
    match out {
        Some(path) => fs::write(&path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn run_templates() -> CliResult<()> {
    for template in builtin_templates()? {
        println!(
            "{}\t{}\t{}",
            template.id,
            template.name,
            template.category.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn run_saves(session: &Session) {
    let current = session.persistence.current_form_id();
    for saved in session.persistence.saved_forms() {
        let marker = if current.as_deref() == Some(saved.id.as_str()) {
            "*"
        } else {
            " "
        };
        let kind = if saved.is_auto_save { "auto" } else { "named" };
        println!(
            "{marker} {}\t{}\t{kind}\t{}",
            saved.id, saved.name, saved.timestamp
        );
    }
}

fn run_preview(
    session: &Session,
    values: Option<String>,
    values_file: Option<PathBuf>,
) -> CliResult<()> {
    let raw = match (values, values_file) {
        (Some(inline), _) => inline,
        (None, Some(path)) => fs::read_to_string(path)?,
        (None, None) => "{}".to_string(),
    };
    let values: FormValues = serde_json::from_str(&raw)?;
    let fields = session.store.fields();
    let visibility = resolve_visibility(fields, &values, VisibilityMode::Preview);
    let visible: Vec<&str> = fields
        .iter()
        .filter(|field| visibility.get(&field.id).copied().unwrap_or(true))
        .map(|field| field.id.as_str())
        .collect();
    let report = serde_json::json!({
        "visible": visible,
        "validation": validate_values(fields, &values),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;
    use serde_json::Value;
    use std::path::Path;

    fn form_builder(dir: &Path) -> Command {
        let mut cmd = Command::cargo_bin("form-builder").expect("binary");
        cmd.arg("--dir").arg(dir).env_remove(LOG_ENV);
        cmd
    }

    fn stdout(cmd: &mut Command) -> String {
        let output = cmd.assert().success().get_output().stdout.clone();
        String::from_utf8(output).expect("utf8 stdout")
    }

    fn session_json(dir: &Path) -> Value {
        let raw = fs::read_to_string(dir.join("formBuilderSession.json")).expect("session file");
        serde_json::from_str(&raw).expect("session json")
    }

    #[test]
    fn add_keeps_submit_last_and_autosaves() -> CliResult<()> {
        let temp = TempDir::new()?;
        form_builder(temp.path())
            .args(["add", "submit", "--label", "Send"])
            .assert()
            .success();
        form_builder(temp.path())
            .args(["add", "text", "--label", "Name", "--required"])
            .assert()
            .success();
        form_builder(temp.path())
            .args(["add", "email", "--label", "Email"])
            .assert()
            .success();

        let listing = stdout(form_builder(temp.path()).arg("list"));
        let labels: Vec<&str> = listing
            .lines()
            .skip(1)
            .filter_map(|line| line.split('\t').nth(3))
            .collect();
        assert_eq!(labels, vec!["Name *", "Email", "Send"]);
        assert!(!listing.lines().next().unwrap_or("").contains("unsaved"));

        let session = session_json(temp.path());
        let forms = session["forms"].as_object().expect("forms");
        assert_eq!(forms.len(), 1);
        Ok(())
    }

    #[test]
    fn moving_a_submit_fails() -> CliResult<()> {
        let temp = TempDir::new()?;
        form_builder(temp.path()).args(["add", "text"]).assert().success();
        form_builder(temp.path()).args(["add", "submit"]).assert().success();
        form_builder(temp.path())
            .args(["move", "1", "0"])
            .assert()
            .failure();
        Ok(())
    }

    #[test]
    fn import_rejects_invalid_file() -> CliResult<()> {
        let temp = TempDir::new()?;
        let input = temp.child("broken.json");
        input.write_str(r#"{ "fields": [ { "id": "a", "label": "A" } ] }"#)?;

        form_builder(temp.path())
            .arg("import")
            .arg(input.path())
            .assert()
            .failure();
        assert!(!temp.path().join("formBuilderSession.json").exists());
        Ok(())
    }

    #[test]
    fn autosave_off_keeps_edits_in_draft_until_saved() -> CliResult<()> {
        let temp = TempDir::new()?;
        form_builder(temp.path())
            .args(["autosave", "off"])
            .assert()
            .success();
        form_builder(temp.path())
            .args(["add", "text", "--label", "Draft only"])
            .assert()
            .success();

        let listing = stdout(form_builder(temp.path()).arg("list"));
        assert!(listing.contains("Draft only"));
        assert!(listing.lines().next().unwrap_or("").contains("unsaved"));
        assert!(!temp.path().join("formBuilderSession.json").exists());

        let id = stdout(form_builder(temp.path()).args(["save", "--name", "Kept"]));
        let session = session_json(temp.path());
        assert_eq!(session["currentFormId"], id.trim());
        assert_eq!(session["forms"][id.trim()]["name"], "Kept");
        Ok(())
    }

    #[test]
    fn template_export_roundtrips_through_import() -> CliResult<()> {
        let source = TempDir::new()?;
        form_builder(source.path())
            .args(["template", "contact"])
            .assert()
            .success();
        let exported = source.child("contact.json");
        form_builder(source.path())
            .arg("export")
            .arg("--out")
            .arg(exported.path())
            .assert()
            .success();

        let target = tempfile::tempdir()?;
        form_builder(target.path())
            .arg("import")
            .arg(exported.path())
            .assert()
            .success();
        let left = stdout(form_builder(source.path()).arg("list"));
        let right = stdout(form_builder(target.path()).arg("list"));
        assert_eq!(left, right);
        Ok(())
    }

    #[test]
    fn preview_reports_visibility_and_validation() -> CliResult<()> {
        let temp = TempDir::new()?;
        let id = stdout(form_builder(temp.path()).args(["add", "email", "--required"]));
        let report = stdout(
            form_builder(temp.path())
                .arg("preview")
                .arg("--values")
                .arg(format!(r#"{{"{}": "nope"}}"#, id.trim())),
        );
        let report: Value = serde_json::from_str(&report)?;
        assert_eq!(report["visible"][0], id.trim());
        assert_eq!(report["validation"]["valid"], false);
        assert_eq!(report["validation"]["errors"][0]["code"], "format_mismatch");
        Ok(())
    }

    #[test]
    fn deleting_unknown_save_fails() -> CliResult<()> {
        let temp = TempDir::new()?;
        form_builder(temp.path())
            .args(["delete", "missing"])
            .assert()
            .failure();
        Ok(())
    }

    #[test]
    fn schema_prints_export_schema() -> CliResult<()> {
        let temp = TempDir::new()?;
        let schema: Value = serde_json::from_str(&stdout(
            form_builder(temp.path()).arg("schema"),
        ))?;
        assert!(schema["properties"]["fields"].is_object());
        Ok(())
    }

    #[test]
    fn schema_template_flag_prints_template_schema() -> CliResult<()> {
        let temp = TempDir::new()?;
        let schema: Value = serde_json::from_str(&stdout(
            form_builder(temp.path()).args(["schema", "--template"]),
        ))?;
        assert!(schema["properties"]["category"].is_object());
        assert!(schema["properties"]["fields"].is_object());
        assert!(schema["properties"].get("createdAt").is_none());
        Ok(())
    }
}
