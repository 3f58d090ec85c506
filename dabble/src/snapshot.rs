//! # Layer snapshots
//!
//! After a layer is redrawn its drawable is read back and PNG encoded on a background thread, so that
//! stroke rendering never waits on compression. Jobs carry the layer's version, and the store only ever
//! moves forward: a late job for an older version never replaces a newer snapshot.

use std::sync::Arc;

use crossbeam::channel;
use dabble_core::state::LayerID;

use crate::config::SnapshotCompression;

pub struct SnapshotJob {
    pub layer: LayerID,
    /// Monotonic per layer.
    pub version: u64,
    pub image: image::RgbaImage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub version: u64,
    /// PNG encoded.
    pub png: Arc<[u8]>,
}

#[derive(Default)]
pub struct SnapshotStore {
    snapshots: parking_lot::RwLock<hashbrown::HashMap<LayerID, Snapshot>>,
}
impl SnapshotStore {
    /// Store a snapshot if it is newer than what is held. Returns whether it was stored.
    pub fn offer(&self, layer: LayerID, snapshot: Snapshot) -> bool {
        let mut snapshots = self.snapshots.write();
        match snapshots.get(&layer) {
            Some(held) if held.version >= snapshot.version => {
                log::trace!(
                    "stale snapshot {} for {layer} dropped, holding {}",
                    snapshot.version,
                    held.version
                );
                false
            }
            _ => {
                snapshots.insert(layer, snapshot);
                true
            }
        }
    }
    #[must_use]
    pub fn get(&self, layer: LayerID) -> Option<Snapshot> {
        self.snapshots.read().get(&layer).cloned()
    }
    pub fn remove(&self, layer: LayerID) -> Option<Snapshot> {
        self.snapshots.write().remove(&layer)
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn encode_png(
    image: &image::RgbaImage,
    compression: SnapshotCompression,
) -> Result<Vec<u8>, png::EncodingError> {
    let mut bytes = Vec::new();
    let mut encoder = png::Encoder::new(&mut bytes, image.width(), image.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(compression.into());
    let mut writer = encoder.write_header()?;
    writer.write_image_data(image.as_raw())?;
    writer.finish()?;
    Ok(bytes)
}

enum Request {
    Encode(SnapshotJob),
    /// Answered once every earlier request is done.
    Flush(channel::Sender<()>),
}

pub struct SnapshotWorker {
    sender: Option<channel::Sender<Request>>,
    thread: Option<std::thread::JoinHandle<()>>,
    store: Arc<SnapshotStore>,
}
impl SnapshotWorker {
    pub fn spawn(compression: SnapshotCompression) -> std::io::Result<Self> {
        let (sender, receiver) = channel::unbounded::<Request>();
        let store = Arc::new(SnapshotStore::default());
        let thread = {
            let store = store.clone();
            std::thread::Builder::new()
                .name("snapshot".to_owned())
                .spawn(move || Self::work(&receiver, &store, compression))?
        };
        Ok(Self {
            sender: Some(sender),
            thread: Some(thread),
            store,
        })
    }
    fn work(
        receiver: &channel::Receiver<Request>,
        store: &SnapshotStore,
        compression: SnapshotCompression,
    ) {
        // Ends when the worker is dropped and the channel closes.
        while let Ok(request) = receiver.recv() {
            match request {
                Request::Encode(job) => match encode_png(&job.image, compression) {
                    Ok(png) => {
                        log::trace!(
                            "snapshot {} v{}: {}",
                            job.layer,
                            job.version,
                            human_bytes::human_bytes(png.len() as f64)
                        );
                        store.offer(
                            job.layer,
                            Snapshot {
                                version: job.version,
                                png: png.into(),
                            },
                        );
                    }
                    Err(e) => log::warn!("failed to encode snapshot of {}: {e}", job.layer),
                },
                Request::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        log::debug!("snapshot worker exiting");
    }
    /// Queue a job. Never blocks.
    pub fn submit(&self, job: SnapshotJob) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.send(Request::Encode(job)).is_err() {
            log::warn!("snapshot worker is gone, job dropped");
        }
    }
    /// Block until every job submitted so far has been stored.
    pub fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (done, wait) = channel::bounded(1);
        if sender.send(Request::Flush(done)).is_ok() {
            let _ = wait.recv();
        }
    }
    #[must_use]
    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }
}
impl Drop for SnapshotWorker {
    fn drop(&mut self) {
        // Close the channel, then let the thread finish what was queued.
        self.sender = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("snapshot worker panicked");
            }
        }
    }
}
