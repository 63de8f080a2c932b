//! Shared test doubles

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use topdf::remote::{RemoteConverter, RemoteError, RenderFormat, Result};

/// In-memory remote converter with scriptable failures
///
/// Like a drive, uploading to a name that already exists overwrites that
/// item and returns the same id. Rendering returns `%PDF <file name>` where
/// the file name is the uploaded name without the pipeline's unique prefix.
/// Tracks how many uploads are outstanding (uploaded, delete not yet
/// attempted).
#[derive(Default)]
pub struct MockConverter {
    state: Mutex<State>,
    render_delay: Duration,
}

#[derive(Default)]
struct State {
    fail_uploads: u32,
    fail_renders: u32,
    fail_deletes: u32,
    next_id: u64,
    /// id -> remote name
    items: HashMap<String, String>,
    /// remote name -> id
    ids: HashMap<String, String>,
    uploads: Vec<String>,
    renders: Vec<String>,
    deletes: Vec<String>,
    outstanding: usize,
    max_outstanding: usize,
}

impl MockConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` uploads (`u32::MAX` for all)
    pub fn fail_uploads(self, n: u32) -> Self {
        self.state.lock().unwrap().fail_uploads = n;
        self
    }

    pub fn fail_renders(self, n: u32) -> Self {
        self.state.lock().unwrap().fail_renders = n;
        self
    }

    pub fn fail_deletes(self, n: u32) -> Self {
        self.state.lock().unwrap().fail_deletes = n;
        self
    }

    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    /// Remote names passed to upload, in call order (including failed calls)
    pub fn remote_names(&self) -> Vec<String> {
        self.state.lock().unwrap().uploads.clone()
    }

    /// Original file names passed to upload, in call order
    pub fn uploads(&self) -> Vec<String> {
        self.remote_names()
            .iter()
            .map(|name| file_name_of(name).to_string())
            .collect()
    }

    pub fn renders(&self) -> Vec<String> {
        self.state.lock().unwrap().renders.clone()
    }

    /// Remote ids passed to delete, in call order (including failed calls)
    pub fn deletes(&self) -> Vec<String> {
        self.state.lock().unwrap().deletes.clone()
    }

    pub fn outstanding(&self) -> usize {
        self.state.lock().unwrap().outstanding
    }

    pub fn max_outstanding(&self) -> usize {
        self.state.lock().unwrap().max_outstanding
    }

    pub fn pdf_for(name: &str) -> Vec<u8> {
        format!("%PDF {}", name).into_bytes()
    }
}

/// Strip the `<pid>-<n>-` prefix the pipeline puts on remote names
fn file_name_of(remote_name: &str) -> &str {
    remote_name.splitn(3, '-').nth(2).unwrap_or(remote_name)
}

fn take_failure(counter: &mut u32) -> bool {
    if *counter == 0 {
        return false;
    }
    if *counter != u32::MAX {
        *counter -= 1;
    }
    true
}

#[async_trait]
impl RemoteConverter for MockConverter {
    async fn upload(&self, name: &str, _content: Bytes) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.uploads.push(name.to_string());

        if take_failure(&mut state.fail_uploads) {
            return Err(RemoteError::Status {
                status: 503,
                message: "upload unavailable".to_string(),
            });
        }

        let id = match state.ids.get(name) {
            Some(existing) => existing.clone(),
            None => {
                state.next_id += 1;
                let id = format!("item-{}", state.next_id);
                state.ids.insert(name.to_string(), id.clone());
                state.items.insert(id.clone(), name.to_string());
                id
            }
        };
        state.outstanding += 1;
        state.max_outstanding = state.max_outstanding.max(state.outstanding);

        Ok(id)
    }

    async fn render(&self, remote_id: &str, format: RenderFormat) -> Result<Bytes> {
        assert_eq!(format, RenderFormat::Pdf);

        if !self.render_delay.is_zero() {
            tokio::time::sleep(self.render_delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.renders.push(remote_id.to_string());

        if take_failure(&mut state.fail_renders) {
            return Err(RemoteError::Timeout);
        }

        let name = state
            .items
            .get(remote_id)
            .cloned()
            .ok_or_else(|| RemoteError::Status {
                status: 404,
                message: remote_id.to_string(),
            })?;

        Ok(Bytes::from(Self::pdf_for(file_name_of(&name))))
    }

    async fn delete(&self, remote_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.deletes.push(remote_id.to_string());
        state.outstanding = state.outstanding.saturating_sub(1);

        if take_failure(&mut state.fail_deletes) {
            return Err(RemoteError::RequestFailed("delete refused".to_string()));
        }

        if let Some(name) = state.items.remove(remote_id) {
            state.ids.remove(&name);
        }
        Ok(())
    }
}
