#![allow(dead_code)]

use std::sync::Arc;

use bollettino_host::artifact::{ArtifactDescriptor, ArtifactProvisioner, Extractor};
use bollettino_host::events::{AppEvent, EventSink};
use bollettino_host::fs::FileSystem;
use tokio::sync::mpsc;

pub use bollettino_test_utils::builders::{ConfigFileBuilder, DescriptorBuilder, release};
pub use bollettino_test_utils::fakes::{
    FakeDownloader, FakeExtractor, FakeFeed, FeedReply, RecordingInstaller,
};
pub use bollettino_test_utils::{drain_event_names, drain_events, init_tracing, with_timeout};

/// Provisioner over the given filesystem/extractor plus its event receiver.
pub fn provisioner(
    descriptor: ArtifactDescriptor,
    fs: Arc<dyn FileSystem>,
    extractor: Arc<dyn Extractor>,
) -> (ArtifactProvisioner, mpsc::Receiver<AppEvent>) {
    let (sink, rx) = EventSink::channel(256);
    (ArtifactProvisioner::new(descriptor, fs, extractor, sink), rx)
}
