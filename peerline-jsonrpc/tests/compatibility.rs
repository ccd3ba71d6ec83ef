//! Replays the conversations scripted in the YAML files under `testdata` against a peer running
//! the test service, checking that everything the peer says matches the script.
//!
//! Each script is a list of steps:
//!
//! - `c`: a message the remote side sends to the peer.  A string is sent verbatim if it isn't
//!   valid JSON, so scripts can send garbage on purpose.
//! - `s`: a message the peer is expected to send back.  Key order doesn't matter.
//! - `nothing`: a period of time during which the peer must stay silent.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use peerline_jsonrpc::PeerBuilder;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

/// The `testing` module is only compiled into the crate under `cfg(test)`, which integration tests
/// don't get.  Include the same file here instead.
#[path = "../src/testing.rs"]
mod test_helpers;
mod test_service;

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct Script {
    #[allow(dead_code)]
    description: String,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Step {
    Send {
        c: JsonValue,
    },
    Expect {
        s: JsonValue,
    },
    ExpectSilence {
        #[serde(with = "humantime_serde")]
        nothing: Duration,
    },
}

/// What happened so far, for explaining a failure
#[derive(Default)]
struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    fn sent(&mut self, step: usize, text: &str) {
        self.lines.push(format!("{:>3} c -> {text}", step + 1));
    }

    fn received(&mut self, step: usize, text: &str) {
        self.lines.push(format!("{:>3} s <- {text}", step + 1));
    }

    fn silent(&mut self, step: usize, period: Duration) {
        self.lines.push(format!("{:>3} (nothing for {period:?})", step + 1));
    }

    fn fail(&self, script: &str, step: usize, reason: impl std::fmt::Display) -> ! {
        let mut report = String::new();
        for line in &self.lines {
            let _ = writeln!(report, "{line}");
        }
        panic!("{script}: step {} failed: {reason}\n\nConversation so far:\n{report}", step + 1);
    }
}

/// Sort object keys recursively so comparisons don't depend on field order
fn normalize(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            JsonValue::Object(keys.into_iter().map(|key| (key.clone(), normalize(&map[key]))).collect())
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(normalize).collect()),
        other => other.clone(),
    }
}

/// Long messages are written as YAML block strings holding JSON; use the JSON inside.  Strings
/// that aren't JSON stay strings.
fn unwrap_json_string(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) => serde_json::from_str(&s).unwrap_or(JsonValue::String(s)),
        other => other,
    }
}

async fn run_script(path: &Path) {
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    let yaml = std::fs::read_to_string(path).unwrap_or_else(|e| panic!("Failed to read {name}: {e}"));
    let script: Script = serde_yaml::from_str(&yaml).unwrap_or_else(|e| panic!("Failed to parse {name}: {e}"));

    let (transport, (mut from_peer, to_peer)) = test_helpers::setup_test_channel();
    let (connection, _state) = test_service::bind_test_service(PeerBuilder::new(), transport);

    let mut transcript = Transcript::default();
    for (index, step) in script.steps.into_iter().enumerate() {
        match step {
            Step::Send { c } => {
                let text = match unwrap_json_string(c) {
                    JsonValue::String(s) => s,
                    json => serde_json::to_string(&json).unwrap(),
                };
                debug!(%text, "Sending");
                if let Err(e) = to_peer.unbounded_send(Ok(text.clone())) {
                    transcript.fail(&name, index, format!("error sending: {e}"));
                }
                transcript.sent(index, &text);
            }
            Step::Expect { s } => {
                let expected = unwrap_json_string(s);
                let text = match tokio::time::timeout(RESPONSE_TIMEOUT, from_peer.next()).await {
                    Ok(Some(text)) => text,
                    Ok(None) => transcript.fail(&name, index, "peer closed the connection"),
                    Err(_) => transcript.fail(
                        &name,
                        index,
                        format!("timed out waiting for {}", serde_json::to_string(&expected).unwrap()),
                    ),
                };
                transcript.received(index, &text);

                let received: JsonValue = serde_json::from_str(&text)
                    .unwrap_or_else(|e| transcript.fail(&name, index, format!("peer sent invalid JSON: {e}")));
                if normalize(&received) != normalize(&expected) {
                    transcript.fail(
                        &name,
                        index,
                        format!(
                            "expected\n{}\nbut received\n{}",
                            serde_json::to_string_pretty(&expected).unwrap(),
                            serde_json::to_string_pretty(&received).unwrap()
                        ),
                    );
                }
            }
            Step::ExpectSilence { nothing } => {
                match tokio::time::timeout(nothing, from_peer.next()).await {
                    Err(_) => {}
                    Ok(Some(text)) => transcript.fail(&name, index, format!("expected silence but got {text}")),
                    Ok(None) => transcript.fail(&name, index, "peer closed the connection"),
                }
                transcript.silent(index, nothing);
            }
        }
    }

    println!("{name} passed:\n{}", transcript.lines.join("\n"));
    connection.shutdown().await.unwrap();
}

#[tokio::test]
async fn compatibility_tests() {
    test_helpers::init_test_logging();

    let testdata = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/testdata");
    let mut scripts = std::fs::read_dir(&testdata)
        .expect("Failed to read testdata directory")
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "yaml" || ext == "yml"))
        .collect::<Vec<PathBuf>>();
    scripts.sort();
    assert!(!scripts.is_empty(), "No scripts found in {}", testdata.display());

    for script in scripts {
        debug!(script = %script.display(), "Running script");
        run_script(&script).await;
    }
}
