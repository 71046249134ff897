//! In-memory daemon used by unit tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use crate::daemon::{
    AddTorrent, ClientError, DaemonApi, Instance, InstanceDescriptor, InstanceRole, TorrentFilter,
    TorrentInfo, TransferInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FakeHealth {
    Ok,
    BadLogin,
    Timeout,
}

pub(crate) struct FakeDaemon {
    name: String,
    health: Mutex<FakeHealth>,
    add_fails: Mutex<bool>,
    add_calls: Mutex<usize>,
    added: Mutex<Vec<String>>,
    torrents: Mutex<Vec<TorrentInfo>>,
    failing_hashes: Mutex<HashSet<String>>,
    paused: Mutex<Vec<String>>,
    resumed: Mutex<Vec<String>>,
    transfer: Mutex<TransferInfo>,
}

#[allow(clippy::unwrap_used)]
impl FakeDaemon {
    pub(crate) fn new(name: &str, health: FakeHealth) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            health: Mutex::new(health),
            add_fails: Mutex::new(false),
            add_calls: Mutex::new(0),
            added: Mutex::new(Vec::new()),
            torrents: Mutex::new(Vec::new()),
            failing_hashes: Mutex::new(HashSet::new()),
            paused: Mutex::new(Vec::new()),
            resumed: Mutex::new(Vec::new()),
            transfer: Mutex::new(TransferInfo::default()),
        })
    }

    pub(crate) fn set_health(&self, health: FakeHealth) {
        *self.health.lock().unwrap() = health;
    }

    pub(crate) fn fail_adds(&self, fail: bool) {
        *self.add_fails.lock().unwrap() = fail;
    }

    pub(crate) fn add_calls(&self) -> usize {
        *self.add_calls.lock().unwrap()
    }

    pub(crate) fn added(&self) -> Vec<String> {
        self.added.lock().unwrap().clone()
    }

    pub(crate) fn set_torrents(&self, torrents: Vec<TorrentInfo>) {
        *self.torrents.lock().unwrap() = torrents;
    }

    pub(crate) fn torrent_state(&self, hash: &str) -> Option<String> {
        self.torrents
            .lock()
            .unwrap()
            .iter()
            .find(|torrent| torrent.hash == hash)
            .map(|torrent| torrent.state.clone())
    }

    pub(crate) fn fail_hash(&self, hash: &str) {
        self.failing_hashes.lock().unwrap().insert(hash.to_string());
    }

    pub(crate) fn paused(&self) -> Vec<String> {
        self.paused.lock().unwrap().clone()
    }

    pub(crate) fn resumed(&self) -> Vec<String> {
        self.resumed.lock().unwrap().clone()
    }

    pub(crate) fn set_transfer(&self, transfer: TransferInfo) {
        *self.transfer.lock().unwrap() = transfer;
    }

    fn gate(&self) -> Result<(), ClientError> {
        match *self.health.lock().unwrap() {
            FakeHealth::Ok => Ok(()),
            FakeHealth::BadLogin => Err(ClientError::auth_rejected(&self.name, "Fails.")),
            FakeHealth::Timeout => Err(ClientError::Timeout {
                instance: self.name.clone(),
                url: "http://fake/".to_string(),
            }),
        }
    }

    fn set_state(&self, hash: &str, paused: bool) -> Result<(), ClientError> {
        if self.failing_hashes.lock().unwrap().contains(hash) {
            return Err(ClientError::http_status(&self.name, "http://fake/", 500));
        }
        let mut torrents = self.torrents.lock().unwrap();
        if let Some(torrent) = torrents.iter_mut().find(|torrent| torrent.hash == hash) {
            torrent.state = match (paused, torrent.is_complete()) {
                (true, true) => "pausedUP",
                (true, false) => "pausedDL",
                (false, true) => "uploading",
                (false, false) => "downloading",
            }
            .to_string();
        }
        Ok(())
    }
}

#[async_trait]
#[allow(clippy::unwrap_used)]
impl DaemonApi for FakeDaemon {
    async fn login(&self) -> Result<(), ClientError> {
        self.gate()
    }

    async fn version(&self) -> Result<String, ClientError> {
        self.gate().map(|()| "v4.6.2".to_string())
    }

    async fn add(&self, torrent: &AddTorrent<'_>) -> Result<(), ClientError> {
        self.gate()?;
        *self.add_calls.lock().unwrap() += 1;
        if *self.add_fails.lock().unwrap() {
            return Err(ClientError::Rejected {
                instance: self.name.clone(),
                operation: "add",
                body: "Fails.".to_string(),
            });
        }
        self.added.lock().unwrap().push(torrent.payload.to_string());
        Ok(())
    }

    async fn list(&self, filter: TorrentFilter) -> Result<Vec<TorrentInfo>, ClientError> {
        self.gate()?;
        let torrents = self.torrents.lock().unwrap();
        Ok(torrents
            .iter()
            .filter(|torrent| match filter {
                // qBittorrent's filter keeps pausedDL/stoppedDL in this list
                TorrentFilter::Downloading => !torrent.is_complete(),
                TorrentFilter::Seeding => !torrent.is_paused() && torrent.is_complete(),
                TorrentFilter::Completed => torrent.is_complete(),
            })
            .cloned()
            .collect())
    }

    async fn pause(&self, hash: &str) -> Result<(), ClientError> {
        self.gate()?;
        self.set_state(hash, true)?;
        self.paused.lock().unwrap().push(hash.to_string());
        Ok(())
    }

    async fn resume(&self, hash: &str) -> Result<(), ClientError> {
        self.gate()?;
        self.set_state(hash, false)?;
        self.resumed.lock().unwrap().push(hash.to_string());
        Ok(())
    }

    async fn transfer_info(&self) -> Result<TransferInfo, ClientError> {
        self.gate()?;
        Ok(*self.transfer.lock().unwrap())
    }
}

#[allow(clippy::unwrap_used)]
pub(crate) fn fake_instance(name: &str, role: InstanceRole, daemon: Arc<FakeDaemon>) -> Instance {
    let url = Url::parse(&format!("http://{name}.test:8080/")).unwrap();
    Instance::new(InstanceDescriptor::new(name, url, role), daemon)
}

pub(crate) fn torrent(hash: &str, progress: f64, state: &str, uploaded: u64) -> TorrentInfo {
    TorrentInfo {
        hash: hash.to_string(),
        name: format!("torrent-{hash}"),
        progress,
        state: state.to_string(),
        uploaded,
        downloaded: 0,
        upspeed: 0,
        dlspeed: 0,
        category: String::new(),
    }
}
