//! Demo host: a two-step feedback journey served over axum.
//!
//! ```text
//! cargo run -p feedback-demo
//! curl http://127.0.0.1:8080/forms/feedback/about-you
//! curl -X POST -d 'name=Ada' http://127.0.0.1:8080/forms/feedback/about-you
//! ```

use clap::Parser;
use serde_json::{json, Value};
use stile_def::FunctionKind;
use stile_engine::{ComponentSpec, FunctionSpec};
use stile_server::{AxumAdapter, EngineOptions, FormEngine};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "feedback-demo", about = "Stile demo server")]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "FEEDBACK_BIND", default_value = "127.0.0.1:8080")]
    bind: String,
}

fn definition() -> Value {
    json!({
        "type": "JOURNEY",
        "code": "feedback",
        "path": "/feedback",
        "title": "Give feedback",
        "entryPath": "/about-you",
        "steps": [
            {
                "type": "STEP",
                "path": "/about-you",
                "title": "About you",
                "isEntryPoint": true,
                "blocks": [
                    {"type": "BLOCK", "variant": "Heading", "content": "Tell us about you"},
                    {
                        "type": "BLOCK",
                        "variant": "TextInput",
                        "code": "name",
                        "formatters": [{"type": "TRANSFORMER", "name": "trim"}],
                        "validate": [
                            {
                                "type": "VALIDATION",
                                "when": {
                                    "type": "TEST",
                                    "subject": {"type": "REFERENCE", "path": ["post", "name"]},
                                    "condition": {"type": "CONDITION", "name": "isEmpty"}
                                },
                                "message": "Enter your name"
                            }
                        ]
                    }
                ],
                "onSubmission": [
                    {
                        "type": "SUBMIT",
                        "validate": true,
                        "onValid": {"next": {"type": "NEXT", "goto": "rating"}}
                    }
                ]
            },
            {
                "type": "STEP",
                "path": "/rating",
                "title": "Your rating",
                "blocks": [
                    {
                        "type": "BLOCK",
                        "variant": "RadioGroup",
                        "code": "score",
                        "options": {
                            "type": "COLLECTION",
                            "collection": {"type": "REFERENCE", "path": ["data", "scores"]},
                            "template": {
                                "type": "FORMAT",
                                "template": "%1 star(s)",
                                "arguments": [{"type": "REFERENCE", "path": ["item"]}]
                            }
                        }
                    }
                ]
            }
        ]
    })
}

fn functions() -> Vec<FunctionSpec> {
    vec![
        FunctionSpec::sync("isEmpty", FunctionKind::Condition, |args, _| {
            Ok(json!(args.first().is_none_or(|v| {
                v.is_null() || v.as_str().is_some_and(|s| s.trim().is_empty())
            })))
        }),
        FunctionSpec::sync("trim", FunctionKind::Transformer, |args, _| {
            Ok(match args.first() {
                Some(Value::String(text)) => json!(text.trim()),
                Some(other) => other.clone(),
                None => Value::Null,
            })
        }),
    ]
}

fn components() -> Vec<ComponentSpec> {
    vec![
        ComponentSpec::new("Heading", json!({"element": "h2"})),
        ComponentSpec::new("TextInput", json!({"element": "input", "inputType": "text"})),
        ComponentSpec::new("RadioGroup", json!({"element": "fieldset"})),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let mut app_data = indexmap::IndexMap::new();
    app_data.insert("scores".to_string(), json!([1, 2, 3, 4, 5]));

    let engine = FormEngine::new(
        AxumAdapter::new(),
        EngineOptions::builder()
            .base_path("/forms")
            .functions(functions())
            .components(components())
            .app_data(app_data)
            .build(),
    )?;
    let app = engine.register(&definition())?;

    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    tracing::info!("feedback demo listening on http://{}", cli.bind);
    axum::serve(listener, app).await?;
    Ok(())
}
