//! In-memory sandbox provider (testing only).
//!
//! `FakeProvider` satisfies the [`SandboxProvider`] / [`SandboxHandle`]
//! contracts without any network access. Sandboxes get sequential ids
//! (`sbx-1`, `sbx-2`, ...), keep their files in memory, and record every kill
//! attempt so tests can assert on cleanup behavior. Failure switches let a
//! test make creation, termination, or code execution fail on demand.

use super::{
    CodeExecution, CommandOutcome, CommandOutput, ExecutionError, FileEntry, FileKind,
    SandboxHandle, SandboxProvider,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct FakeState {
    next_id: AtomicUsize,
    next_pid: AtomicU32,
    create_calls: AtomicUsize,
    fail_create: AtomicBool,
    fail_kill: AtomicBool,
    fail_code: AtomicBool,
    hold_creates: AtomicBool,
    hold_code: AtomicBool,
    kills: Mutex<Vec<String>>,
}

#[derive(Default)]
pub struct FakeProvider {
    state: Arc<FakeState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of remote create calls that reached the provider.
    pub fn create_calls(&self) -> usize {
        self.state.create_calls.load(Ordering::SeqCst)
    }

    /// Ids of every kill attempt, in order, including failed ones.
    pub fn kills(&self) -> Vec<String> {
        self.state.kills.lock().clone()
    }

    pub fn fail_create(&self, fail: bool) {
        self.state.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_kill(&self, fail: bool) {
        self.state.fail_kill.store(fail, Ordering::SeqCst);
    }

    pub fn fail_code(&self, fail: bool) {
        self.state.fail_code.store(fail, Ordering::SeqCst);
    }

    /// While set, `create` stays pending instead of completing.
    pub fn hold_creates(&self, hold: bool) {
        self.state.hold_creates.store(hold, Ordering::SeqCst);
    }

    /// While set, `run_code` stays pending instead of completing.
    pub fn hold_code(&self, hold: bool) {
        self.state.hold_code.store(hold, Ordering::SeqCst);
    }
}

#[async_trait]
impl SandboxProvider for FakeProvider {
    async fn create(&self, timeout_ms: u64) -> anyhow::Result<Arc<dyn SandboxHandle>> {
        self.state.create_calls.fetch_add(1, Ordering::SeqCst);
        while self.state.hold_creates.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        anyhow::ensure!(
            !self.state.fail_create.load(Ordering::SeqCst),
            "fake provider refused to create a sandbox"
        );

        let n = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(FakeSandbox {
            id: format!("sbx-{n}"),
            timeout_ms,
            files: Mutex::new(BTreeMap::new()),
            state: Arc::clone(&self.state),
        }))
    }
}

/// A sandbox whose filesystem is a map of absolute path → bytes.
pub struct FakeSandbox {
    id: String,
    timeout_ms: u64,
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    state: Arc<FakeState>,
}

impl FakeSandbox {
    fn children(&self, folder: &str) -> Vec<FileEntry> {
        let prefix = if folder.ends_with('/') {
            folder.to_string()
        } else {
            format!("{folder}/")
        };

        let mut entries: BTreeMap<String, FileKind> = BTreeMap::new();
        for path in self.files.lock().keys() {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    entries.insert(dir.to_string(), FileKind::Dir);
                }
                None => {
                    entries.entry(rest.to_string()).or_insert(FileKind::File);
                }
            }
        }
        entries
            .into_iter()
            .map(|(name, kind)| FileEntry::new(name, kind))
            .collect()
    }
}

#[async_trait]
impl SandboxHandle for FakeSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Echoes the source back as stdout. Code containing `raise` produces an
    /// interpreter error instead.
    async fn run_code(&self, code: &str) -> anyhow::Result<CodeExecution> {
        while self.state.hold_code.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        anyhow::ensure!(
            !self.state.fail_code.load(Ordering::SeqCst),
            "code interpreter unavailable"
        );
        if code.contains("raise") {
            return Ok(CodeExecution {
                error: Some(ExecutionError {
                    name: "Exception".into(),
                    value: code.to_string(),
                    traceback: String::new(),
                }),
                ..CodeExecution::default()
            });
        }
        Ok(CodeExecution {
            stdout: vec![format!("{code}\n")],
            ..CodeExecution::default()
        })
    }

    /// Understands `ls [dir]`, `cat <file>`, `false`; anything else succeeds
    /// silently.
    async fn run_command(
        &self,
        command: &str,
        background: bool,
    ) -> anyhow::Result<CommandOutcome> {
        if background {
            let pid = self.state.next_pid.fetch_add(1, Ordering::SeqCst) + 100;
            return Ok(CommandOutcome::Background { pid });
        }

        let mut words = command.split_whitespace();
        let output = match words.next() {
            Some("ls") => {
                let dir = words.find(|w| !w.starts_with('-')).unwrap_or("/");
                let names: Vec<String> = self.children(dir).into_iter().map(|e| e.name).collect();
                CommandOutput {
                    stdout: names.join("\n"),
                    ..CommandOutput::default()
                }
            }
            Some("cat") => {
                let path = words.next().unwrap_or_default();
                match self.files.lock().get(path) {
                    Some(bytes) => CommandOutput {
                        stdout: String::from_utf8_lossy(bytes).into_owned(),
                        ..CommandOutput::default()
                    },
                    None => CommandOutput {
                        stderr: format!("cat: {path}: No such file or directory"),
                        exit_code: 1,
                        ..CommandOutput::default()
                    },
                }
            }
            Some("false") => CommandOutput {
                exit_code: 1,
                ..CommandOutput::default()
            },
            _ => CommandOutput::default(),
        };
        Ok(CommandOutcome::Finished(output))
    }

    async fn read_file(&self, path: &str) -> anyhow::Result<String> {
        let files = self.files.lock();
        let bytes = files
            .get(path)
            .ok_or_else(|| anyhow::anyhow!("File not found: {path}"))?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> anyhow::Result<()> {
        self.files.lock().insert(path.to_string(), content.to_vec());
        Ok(())
    }

    async fn list_files(&self, path: &str) -> anyhow::Result<Vec<FileEntry>> {
        Ok(self.children(path))
    }

    fn url(&self, port: u16) -> String {
        format!("https://{port}-{}.fake.local", self.id)
    }

    async fn download_url(
        &self,
        path: &str,
        expires_in_secs: Option<u64>,
    ) -> anyhow::Result<String> {
        let mut url = format!(
            "https://fake.local/{}/files?path={}",
            self.id,
            urlencoding::encode(path)
        );
        if let Some(secs) = expires_in_secs {
            url.push_str(&format!("&expires_in={secs}"));
        }
        Ok(url)
    }

    async fn kill(&self) -> anyhow::Result<()> {
        self.state.kills.lock().push(self.id.clone());
        anyhow::ensure!(
            !self.state.fail_kill.load(Ordering::SeqCst),
            "fake provider refused to kill {}",
            self.id
        );
        Ok(())
    }
}
