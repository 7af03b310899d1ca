//! Line-oriented session over stdin
//!
//! Identities only live as long as the process, so a session keeps one
//! registry alive across commands. Every reply is a single JSON line:
//! `{"ok": true, ...}` or `{"ok": false, "error": {"code": ..., "message": ...}}`.
//! Arguments split on whitespace; wrap one in `"..."` or `'...'` to keep
//! spaces, e.g. `ingest <id> "My Notes/todo list.md" --index notes`.

use anyhow::Result;
use clap::Args;
use ragstash_core::{content_type_for_path, Document, RagConfig, RagId, RagService};
use serde_json::{json, Value};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

const INGEST_USAGE: &str = "ingest <id> <file> [content-type] [--index <name>]";

const COMMANDS: &[&str] = &[
    "create <json>",
    INGEST_USAGE,
    "query <id> <index> <text...>",
    "describe <id>",
    "list",
    "drop <id>",
    "providers",
    "heartbeat",
    "help",
    "quit",
];

#[derive(Args)]
pub struct ShellCommand {}

impl ShellCommand {
    pub async fn execute(self, service: &RagService) -> Result<()> {
        let session = Session::new(service);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(line) = lines.next_line().await? {
            match session.handle(&line).await {
                Reply::Quit => break,
                Reply::Skip => continue,
                Reply::Value(value) => println!("{}", value),
            }
        }

        log::debug!("Shell session ended");
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
enum Reply {
    Value(Value),
    Skip,
    Quit,
}

#[derive(Debug)]
struct Failure {
    code: &'static str,
    message: String,
}

impl Failure {
    fn usage(message: impl Into<String>) -> Self {
        Self {
            code: "USAGE",
            message: message.into(),
        }
    }
}

impl From<ragstash_core::Error> for Failure {
    fn from(err: ragstash_core::Error) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for Failure {
    fn from(err: std::io::Error) -> Self {
        Self {
            code: "IO",
            message: err.to_string(),
        }
    }
}

struct Session<'a> {
    service: &'a RagService,
}

impl<'a> Session<'a> {
    fn new(service: &'a RagService) -> Self {
        Self { service }
    }

    async fn handle(&self, line: &str) -> Reply {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Reply::Skip;
        }

        let (command, rest) = line
            .split_once(char::is_whitespace)
            .map(|(c, r)| (c, r.trim()))
            .unwrap_or((line, ""));

        if matches!(command, "quit" | "exit") {
            return Reply::Quit;
        }

        let outcome = match command {
            "create" => self.create(rest).await,
            "ingest" => self.ingest(rest).await,
            "query" => self.query(rest).await,
            "describe" => self.describe(rest).await,
            "list" => Ok(json!({ "ids": self.service.registry().ids().await })),
            "drop" => self.drop_rag(rest).await,
            "providers" => Ok(json!({
                "providers": self
                    .service
                    .providers()
                    .iter()
                    .map(|p| json!({ "provider": p.tag(), "kind": p.kind() }))
                    .collect::<Vec<_>>()
            })),
            "heartbeat" => Ok(json!({ "heartbeat": self.service.heartbeat() })),
            "help" => Ok(json!({ "commands": COMMANDS })),
            other => Err(Failure {
                code: "UNKNOWN_COMMAND",
                message: format!("Unknown command '{}'. Try 'help'.", other),
            }),
        };

        Reply::Value(match outcome {
            Ok(Value::Object(mut body)) => {
                body.insert("ok".to_string(), Value::Bool(true));
                Value::Object(body)
            }
            Ok(other) => json!({ "ok": true, "value": other }),
            Err(failure) => json!({
                "ok": false,
                "error": { "code": failure.code, "message": failure.message },
            }),
        })
    }

    async fn create(&self, payload: &str) -> std::result::Result<Value, Failure> {
        if payload.is_empty() {
            return Err(Failure::usage("create <json>"));
        }
        let config = RagConfig::from_json(payload)?;
        let id = self.service.make_rag(config).await?;
        Ok(json!({ "id": id }))
    }

    async fn ingest(&self, args: &str) -> std::result::Result<Value, Failure> {
        let mut index = None;
        let mut positional = Vec::new();
        let mut args = split_args(args)?.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--index" | "-i" => {
                    index = Some(args.next().ok_or_else(|| Failure::usage(INGEST_USAGE))?);
                }
                _ => positional.push(arg),
            }
        }

        let (id, file, content_type) = match positional.as_slice() {
            [id, file] => (id, file, None),
            [id, file, content_type] => (id, file, Some(content_type.as_str())),
            _ => return Err(Failure::usage(INGEST_USAGE)),
        };

        let path = Path::new(file);
        let bytes = tokio::fs::read(path).await?;
        let content_type = content_type.unwrap_or_else(|| content_type_for_path(path));
        let mut document = Document::new(bytes, content_type);
        if let Some(name) = path.file_name() {
            document = document.with_file_name(name.to_string_lossy());
        }
        if let Some(index) = index {
            document = document.with_index(index);
        }

        let task = self
            .service
            .ingest_file(&RagId::from(id.as_str()), &document)
            .await?;
        Ok(json!({ "task": task }))
    }

    async fn query(&self, args: &str) -> std::result::Result<Value, Failure> {
        let mut parts = args.splitn(3, char::is_whitespace);
        let (Some(id), Some(index), Some(text)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Failure::usage("query <id> <index> <text...>"));
        };

        let hits = self
            .service
            .retrieve_query(&RagId::from(id), index, text.trim())
            .await?;
        Ok(json!({ "results": hits }))
    }

    async fn describe(&self, id: &str) -> std::result::Result<Value, Failure> {
        if id.is_empty() {
            return Err(Failure::usage("describe <id>"));
        }
        let rag = self.service.describe(&RagId::from(id)).await?;
        Ok(json!({ "rag": rag }))
    }

    async fn drop_rag(&self, id: &str) -> std::result::Result<Value, Failure> {
        if id.is_empty() {
            return Err(Failure::usage("drop <id>"));
        }
        let entry = self.service.registry().remove(&RagId::from(id)).await?;
        Ok(json!({ "dropped": entry.id }))
    }
}

/// Split on whitespace, keeping single- or double-quoted runs together.
fn split_args(line: &str) -> std::result::Result<Vec<String>, Failure> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut started = false;
    let mut quote = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                started = true;
            }
            None if c.is_whitespace() => {
                if started {
                    args.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            None => {
                current.push(c);
                started = true;
            }
        }
    }

    if quote.is_some() {
        return Err(Failure::usage("unterminated quote"));
    }
    if started {
        args.push(current);
    }
    Ok(args)
}
