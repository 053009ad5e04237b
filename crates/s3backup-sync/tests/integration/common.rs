//! Shared test helpers: an in-memory object store that records every call
//! and can be told to fail or stall specific operations, plus fixtures for
//! files with controlled modification times.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, bail};
use s3backup_core::ports::{CompletedPart, IObjectStore, MultipartHandle};

/// One recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exists(String),
    Delete(String),
    Put(String),
    Initiate(String),
    UploadPart(u32),
    Complete(Vec<u32>),
    Abort(String),
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, Vec<u8>>,
    uploads: BTreeMap<String, BTreeMap<u32, Vec<u8>>>,
    calls: Vec<Call>,
    puts: usize,
    next_upload: usize,
}

/// In-memory [`IObjectStore`] double
#[derive(Default)]
pub struct RecordingStore {
    state: Mutex<State>,
    put_delay: Duration,
    part_delay: Duration,
    scramble_parts: bool,
    fail_nth_put: Option<usize>,
    fail_part: Option<u32>,
    fail_abort: bool,
    fail_delete: bool,
}

#[allow(dead_code)]
impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every successful `put_object` sleeps for `delay` first
    pub fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = delay;
        self
    }

    /// Every part upload sleeps for `delay` first
    pub fn with_part_delay(mut self, delay: Duration) -> Self {
        self.part_delay = delay;
        self
    }

    /// Part uploads finish in an order unrelated to their numbers
    pub fn with_scrambled_parts(mut self) -> Self {
        self.scramble_parts = true;
        self
    }

    /// The `n`th `put_object` call (1-based) fails immediately
    pub fn failing_put(mut self, n: usize) -> Self {
        self.fail_nth_put = Some(n);
        self
    }

    pub fn failing_part(mut self, part_number: u32) -> Self {
        self.fail_part = Some(part_number);
        self
    }

    pub fn failing_abort(mut self) -> Self {
        self.fail_abort = true;
        self
    }

    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| matches(c)).count()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn insert_object(&self, key: &str, data: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(key.to_string(), data.to_vec());
    }

    pub fn open_uploads(&self) -> usize {
        self.state.lock().unwrap().uploads.len()
    }
}

#[async_trait::async_trait]
impl IObjectStore for RecordingStore {
    async fn exists(&self, _bucket: &str, key: &str) -> anyhow::Result<bool> {
        self.record(Call::Exists(key.to_string()));
        Ok(self.state.lock().unwrap().objects.contains_key(key))
    }

    async fn delete(&self, _bucket: &str, key: &str) -> anyhow::Result<()> {
        self.record(Call::Delete(key.to_string()));
        if self.fail_delete {
            bail!("injected delete failure");
        }
        self.state.lock().unwrap().objects.remove(key);
        Ok(())
    }

    async fn put_object(&self, _bucket: &str, key: &str, data: &[u8]) -> anyhow::Result<()> {
        let nth = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Put(key.to_string()));
            state.puts += 1;
            state.puts
        };
        if self.fail_nth_put == Some(nth) {
            bail!("injected put failure");
        }
        tokio::time::sleep(self.put_delay).await;
        self.insert_object(key, data);
        Ok(())
    }

    async fn initiate_multipart(&self, bucket: &str, key: &str) -> anyhow::Result<MultipartHandle> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Initiate(key.to_string()));
        state.next_upload += 1;
        let upload_id = format!("upload-{}", state.next_upload);
        state.uploads.insert(upload_id.clone(), BTreeMap::new());
        Ok(MultipartHandle {
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id,
        })
    }

    async fn upload_part(
        &self,
        handle: &MultipartHandle,
        part_number: u32,
        data: &[u8],
    ) -> anyhow::Result<String> {
        self.record(Call::UploadPart(part_number));

        let mut delay = self.part_delay;
        if self.scramble_parts {
            delay += Duration::from_millis(u64::from((part_number * 7) % 5) * 3);
        }
        tokio::time::sleep(delay).await;

        if self.fail_part == Some(part_number) {
            bail!("injected failure on part {part_number}");
        }

        let mut state = self.state.lock().unwrap();
        let parts = state
            .uploads
            .get_mut(&handle.upload_id)
            .ok_or_else(|| anyhow!("no such upload"))?;
        parts.insert(part_number, data.to_vec());
        Ok(format!("etag-{part_number}"))
    }

    async fn complete_multipart(
        &self,
        handle: &MultipartHandle,
        parts: &[CompletedPart],
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(Call::Complete(parts.iter().map(|p| p.part_number).collect()));

        let staged = state
            .uploads
            .remove(&handle.upload_id)
            .ok_or_else(|| anyhow!("no such upload"))?;
        let mut body = Vec::new();
        for part in parts {
            let data = staged
                .get(&part.part_number)
                .ok_or_else(|| anyhow!("part {} missing", part.part_number))?;
            body.extend_from_slice(data);
        }
        state.objects.insert(handle.key.clone(), body);
        Ok(())
    }

    async fn abort_multipart(&self, handle: &MultipartHandle) -> anyhow::Result<()> {
        self.record(Call::Abort(handle.upload_id.clone()));
        if self.fail_abort {
            bail!("injected abort failure");
        }
        self.state.lock().unwrap().uploads.remove(&handle.upload_id);
        Ok(())
    }
}

/// Writes `body` to `dir/name`, creating parent directories
pub fn write_file(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, body).unwrap();
    path
}

/// Writes a file whose modification time is `age` in the past
#[allow(dead_code)]
pub fn write_aged_file(dir: &Path, name: &str, age: Duration) -> PathBuf {
    let path = write_file(dir, name, b"dump");
    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
    path
}

pub fn days(n: u64) -> Duration {
    Duration::from_secs(n * 24 * 60 * 60)
}

/// Deterministic bytes of length `len`
pub fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
