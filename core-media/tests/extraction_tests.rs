//! Stream extraction against a mocked media toolkit.

mod common;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::{
    ContainerInfo, MediaFrame, MediaKind, MediaPacket, MediaSource, MediaToolkit, OutputMode,
    OutputSpec, PacketReader, PacketWriter, StreamInfo, StreamKind,
};
use bytes::Bytes;
use common::{backend, context, scratch, FakeEngine};
use core_media::{
    ExtractionConfig, ExtractionPipeline, MediaContext, MediaError, MediaItem, Progress,
    StreamExtractor, StreamId,
};
use core_runtime::events::{CoreEvent, ExtractState, ExtractionEvent};
use mockall::mock;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

mock! {
    pub Toolkit {}

    #[async_trait]
    impl MediaToolkit for Toolkit {
        async fn open_input(&self, path: &Path) -> bridge_traits::Result<Box<dyn PacketReader>>;
        async fn open_output(
            &self,
            path: &Path,
            spec: OutputSpec,
        ) -> bridge_traits::Result<Box<dyn PacketWriter>>;
    }
}

// ============================================================================
// Scripted reader and recording writer
// ============================================================================

struct ScriptedReader {
    info: ContainerInfo,
    packets: VecDeque<MediaPacket>,
    reads: Arc<AtomicUsize>,
}

#[async_trait]
impl PacketReader for ScriptedReader {
    fn info(&self) -> &ContainerInfo {
        &self.info
    }

    async fn read_packet(&mut self) -> bridge_traits::Result<Option<MediaPacket>> {
        let packet = self.packets.pop_front();
        if packet.is_some() {
            self.reads.fetch_add(1, Ordering::SeqCst);
        }
        Ok(packet)
    }

    async fn decode(&mut self, packet: MediaPacket) -> bridge_traits::Result<Vec<MediaFrame>> {
        Ok(vec![MediaFrame {
            stream_index: packet.stream_index,
            pts_us: packet.pts_us,
            data: packet.data,
        }])
    }
}

struct RecordingWriter {
    path: PathBuf,
    gate: Option<Arc<Semaphore>>,
    written: Arc<Mutex<Vec<i64>>>,
}

impl RecordingWriter {
    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
    }
}

#[async_trait]
impl PacketWriter for RecordingWriter {
    async fn write_packet(&mut self, packet: MediaPacket) -> bridge_traits::Result<()> {
        self.pass_gate().await;
        self.written.lock().push(packet.pts_us);
        Ok(())
    }

    async fn encode_frame(&mut self, frame: MediaFrame) -> bridge_traits::Result<()> {
        self.pass_gate().await;
        self.written.lock().push(frame.pts_us);
        Ok(())
    }

    async fn finish(&mut self) -> bridge_traits::Result<()> {
        let count = self.written.lock().len();
        tokio::fs::write(&self.path, format!("{count} units")).await?;
        Ok(())
    }
}

fn stream(index: usize, kind: StreamKind, codec: &str) -> StreamInfo {
    StreamInfo {
        index,
        kind,
        codec: codec.into(),
        language: None,
    }
}

fn container(duration_us: i64) -> ContainerInfo {
    ContainerInfo {
        format: "mkv".into(),
        duration_us,
        streams: vec![
            stream(0, StreamKind::Video, "h264"),
            stream(1, StreamKind::Audio, "aac"),
        ],
    }
}

/// `count` packets alternating between video and audio, 1 ms apart.
fn interleaved(count: i64) -> VecDeque<MediaPacket> {
    (0..count)
        .map(|i| MediaPacket {
            stream_index: (i % 2) as usize,
            pts_us: i * 1_000,
            keyframe: i % 2 == 0,
            data: Bytes::from_static(b"pkt"),
        })
        .collect()
}

fn movie() -> MediaItem {
    MediaItem::builder("screen", "/video/movie.mkv")
        .kind(MediaKind::Video)
        .stream(StreamKind::Video, 0)
        .stream(StreamKind::Audio, 1)
        .build()
        .unwrap()
}

fn audio1() -> StreamId {
    StreamId::new(StreamKind::Audio, 1)
}

/// Toolkit whose inputs replay `packets` and whose outputs honor `gate`.
fn toolkit(
    duration_us: i64,
    packets: i64,
    gate: Option<Arc<Semaphore>>,
    runs: usize,
) -> MockToolkit {
    let mut toolkit = MockToolkit::new();
    toolkit.expect_open_input().times(runs).returning(move |_| {
        Ok(Box::new(ScriptedReader {
            info: container(duration_us),
            packets: interleaved(packets),
            reads: Arc::new(AtomicUsize::new(0)),
        }) as Box<dyn PacketReader>)
    });
    toolkit
        .expect_open_output()
        .times(runs)
        .returning(move |path, _| {
            Ok(Box::new(RecordingWriter {
                path: path.to_path_buf(),
                gate: gate.clone(),
                written: Arc::new(Mutex::new(Vec::new())),
            }) as Box<dyn PacketWriter>)
        });
    toolkit
}

fn extractor(toolkit: MockToolkit, ctx: &MediaContext) -> StreamExtractor {
    StreamExtractor::new(
        Arc::new(toolkit),
        ctx.clone(),
        ExtractionConfig::default().with_progress_interval(Duration::from_millis(5)),
    )
    .unwrap()
}

fn extraction_events(events: Vec<CoreEvent>) -> Vec<ExtractionEvent> {
    events
        .into_iter()
        .filter_map(|e| match e {
            CoreEvent::Extraction(x) => Some(x),
            _ => None,
        })
        .collect()
}

fn states(events: &[ExtractionEvent]) -> Vec<ExtractState> {
    events
        .iter()
        .filter_map(|e| match e {
            ExtractionEvent::StateChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Pipeline
// ============================================================================

#[tokio::test]
async fn full_queue_holds_back_the_decoder() {
    let reads = Arc::new(AtomicUsize::new(0));
    let written = Arc::new(Mutex::new(Vec::new()));
    let gate = Arc::new(Semaphore::new(0));

    let packets: VecDeque<MediaPacket> = (0..1000)
        .map(|i| MediaPacket {
            stream_index: 0,
            pts_us: i * 1_000,
            keyframe: true,
            data: Bytes::from_static(b"v"),
        })
        .collect();
    let reader = ScriptedReader {
        info: container(1_000_000),
        packets,
        reads: reads.clone(),
    };
    let writer = RecordingWriter {
        path: scratch("backpressure").with_extension("bin"),
        gate: Some(gate.clone()),
        written: written.clone(),
    };
    let target = writer.path.clone();
    tokio::fs::create_dir_all(target.parent().unwrap()).await.unwrap();

    let pipeline = ExtractionPipeline::new(256, Duration::from_millis(5));
    let progress = Progress::new();
    let run = {
        let progress = progress.clone();
        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let outcome = pipeline
                .run(
                    Box::new(reader),
                    Box::new(writer),
                    0,
                    &OutputMode::Remux,
                    progress,
                    &cancel,
                    |_| {},
                )
                .await;
            outcome
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    let read_ahead = reads.load(Ordering::SeqCst);
    assert!(
        (257..=258).contains(&read_ahead),
        "decoder read {read_ahead} packets past a stalled writer"
    );

    gate.add_permits(1000);
    let stats = run.await.unwrap().unwrap();
    assert_eq!(stats.packets_read, 1000);
    assert_eq!(stats.units_written, 1000);
    assert_eq!(stats.discarded, 0);
    assert_eq!(
        *written.lock(),
        (0..1000).map(|i| i * 1_000).collect::<Vec<i64>>()
    );
    assert_eq!(progress.value(), 1.0);

    let _ = tokio::fs::remove_file(&target).await;
}

// ============================================================================
// Extractor
// ============================================================================

#[tokio::test]
async fn audio_stream_is_transcoded_to_named_artifact() {
    let root = scratch("extract-audio");
    let (ctx, bus) = context(&root);
    let mut events = bus.stream();
    let extractor = extractor(toolkit(200_000, 200, None, 1), &ctx);
    let item = movie();

    let path = extractor
        .extract(&item, audio1(), item.source_path(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        path,
        extractor.output_directory().join("screen").join("movie.audio1.wav")
    );
    assert_eq!(extractor.artifact_directory(&item), path.parent().unwrap());
    assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "100 units");
    assert!(!tokio::fs::try_exists(path.with_extension("wav.part")).await.unwrap());

    let stream = item.stream(audio1()).unwrap();
    assert_eq!(stream.extract_state(), ExtractState::Extracted);
    assert_eq!(stream.progress().value(), 1.0);

    let seen = extraction_events(events.drain());
    assert_eq!(
        states(&seen),
        vec![ExtractState::Extracting, ExtractState::Extracted]
    );

    // Second call is served from the artifact; the mock allows one run only.
    let again = extractor
        .extract(&item, audio1(), item.source_path(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(again, path);

    let _ = tokio::fs::remove_dir_all(&root).await;
}

#[tokio::test]
async fn concurrent_requests_share_one_extraction() {
    let root = scratch("extract-dedup");
    let (ctx, _bus) = context(&root);
    let gate = Arc::new(Semaphore::new(0));
    let extractor = extractor(toolkit(100_000, 100, Some(gate.clone()), 1), &ctx);
    let item = movie();

    let spawn = |extractor: StreamExtractor, item: MediaItem| {
        tokio::spawn(async move {
            let source = item.source_path().to_path_buf();
            extractor
                .extract(&item, audio1(), &source, CancellationToken::new())
                .await
        })
    };
    let first = spawn(extractor.clone(), item.clone());
    tokio::time::sleep(Duration::from_millis(30)).await;
    let second = spawn(extractor.clone(), item.clone());
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(extractor.active_extractions().await, 1);
    assert_eq!(
        item.stream(audio1()).unwrap().extract_state(),
        ExtractState::Extracting
    );

    gate.add_permits(1_000);
    let a = first.await.unwrap().unwrap();
    let b = second.await.unwrap().unwrap();
    assert_eq!(a, b);
    assert_eq!(extractor.active_extractions().await, 0);

    let _ = tokio::fs::remove_dir_all(&root).await;
}

#[tokio::test]
async fn unknown_duration_reports_no_progress() {
    let root = scratch("extract-zero");
    let (ctx, bus) = context(&root);
    let mut events = bus.stream();
    let extractor = extractor(toolkit(0, 40, None, 1), &ctx);
    let item = movie();
    let video0 = StreamId::new(StreamKind::Video, 0);

    let path = extractor
        .extract(&item, video0, item.source_path(), CancellationToken::new())
        .await
        .unwrap();
    assert!(path.ends_with("movie.video0.mkv"));

    let seen = extraction_events(events.drain());
    assert!(!seen
        .iter()
        .any(|e| matches!(e, ExtractionEvent::Progress { .. })));
    assert_eq!(
        states(&seen),
        vec![ExtractState::Extracting, ExtractState::Extracted]
    );
    assert_eq!(item.stream(video0).unwrap().progress().value(), 0.0);

    let _ = tokio::fs::remove_dir_all(&root).await;
}

#[tokio::test]
async fn remove_deletes_artifact_and_allows_reextraction() {
    let root = scratch("extract-remove");
    let (ctx, bus) = context(&root);
    let extractor = extractor(toolkit(50_000, 50, None, 2), &ctx);
    let item = movie();

    let path = extractor
        .extract(&item, audio1(), item.source_path(), CancellationToken::new())
        .await
        .unwrap();
    let mut events = bus.stream();

    extractor.remove(&item, audio1()).await.unwrap();
    assert!(!tokio::fs::try_exists(&path).await.unwrap());
    assert_eq!(
        item.stream(audio1()).unwrap().extract_state(),
        ExtractState::NotExtracted
    );
    assert_eq!(
        states(&extraction_events(events.drain())),
        vec![ExtractState::NotExtracted]
    );
    assert!(extractor.extracted_path(&item, audio1()).await.unwrap().is_none());

    // Removing again is a no-op.
    extractor.remove(&item, audio1()).await.unwrap();

    let again = extractor
        .extract(&item, audio1(), item.source_path(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(again, path);

    let _ = tokio::fs::remove_dir_all(&root).await;
}

#[tokio::test]
async fn same_titled_items_of_different_owners_do_not_collide() {
    let root = scratch("extract-owners");
    let (ctx, _bus) = context(&root);
    let extractor = extractor(toolkit(50_000, 50, None, 2), &ctx);
    let screen = movie();
    let deck = MediaItem::builder("deck", "/archive/movie.mkv")
        .kind(MediaKind::Video)
        .stream(StreamKind::Video, 0)
        .stream(StreamKind::Audio, 1)
        .build()
        .unwrap();

    let on_screen = extractor
        .extract(&screen, audio1(), screen.source_path(), CancellationToken::new())
        .await
        .unwrap();
    let on_deck = extractor
        .extract(&deck, audio1(), deck.source_path(), CancellationToken::new())
        .await
        .unwrap();
    assert_ne!(on_screen, on_deck);
    assert_eq!(on_screen.file_name(), on_deck.file_name());

    extractor.remove(&screen, audio1()).await.unwrap();
    assert!(!tokio::fs::try_exists(&on_screen).await.unwrap());
    assert!(tokio::fs::try_exists(&on_deck).await.unwrap());
    assert_eq!(
        extractor.extracted_path(&deck, audio1()).await.unwrap(),
        Some(on_deck)
    );

    let _ = tokio::fs::remove_dir_all(&root).await;
}

#[tokio::test]
async fn externally_deleted_artifact_is_demoted() {
    let root = scratch("extract-stale");
    let (ctx, _bus) = context(&root);
    let extractor = extractor(toolkit(50_000, 50, None, 1), &ctx);
    let item = movie();

    let path = extractor
        .extract(&item, audio1(), item.source_path(), CancellationToken::new())
        .await
        .unwrap();
    tokio::fs::remove_file(&path).await.unwrap();

    assert!(extractor.extracted_path(&item, audio1()).await.unwrap().is_none());
    assert_eq!(
        item.stream(audio1()).unwrap().extract_state(),
        ExtractState::NotExtracted
    );

    let _ = tokio::fs::remove_dir_all(&root).await;
}

#[tokio::test]
async fn cancelled_extraction_leaves_no_artifact() {
    let root = scratch("extract-cancel");
    let (ctx, _bus) = context(&root);
    let gate = Arc::new(Semaphore::new(0));
    let extractor = extractor(toolkit(100_000, 100, Some(gate), 1), &ctx);
    let item = movie();
    let cancel = CancellationToken::new();

    let task = {
        let extractor = extractor.clone();
        let item = item.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let source = item.source_path().to_path_buf();
            extractor.extract(&item, audio1(), &source, cancel).await
        })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    cancel.cancel();

    assert!(matches!(task.await.unwrap(), Err(MediaError::Cancelled)));
    assert_eq!(
        item.stream(audio1()).unwrap().extract_state(),
        ExtractState::NotExtracted
    );

    let mut leftovers = tokio::fs::read_dir(extractor.artifact_directory(&item)).await.unwrap();
    assert!(leftovers.next_entry().await.unwrap().is_none());

    let _ = tokio::fs::remove_dir_all(&root).await;
}

#[tokio::test]
async fn mismatched_stream_kind_is_rejected() {
    let root = scratch("extract-kind");
    let (ctx, _bus) = context(&root);
    let mut toolkit = MockToolkit::new();
    toolkit.expect_open_input().times(1).returning(|_| {
        Ok(Box::new(ScriptedReader {
            info: ContainerInfo {
                format: "mkv".into(),
                duration_us: 1_000,
                streams: vec![stream(1, StreamKind::Subtitle, "srt")],
            },
            packets: VecDeque::new(),
            reads: Arc::new(AtomicUsize::new(0)),
        }) as Box<dyn PacketReader>)
    });
    toolkit.expect_open_output().never();
    let extractor = extractor(toolkit, &ctx);
    let item = movie();

    let err = extractor
        .extract(&item, audio1(), item.source_path(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::Validation(_)));
    assert_eq!(
        item.stream(audio1()).unwrap().extract_state(),
        ExtractState::NotExtracted
    );

    let _ = tokio::fs::remove_dir_all(&root).await;
}

#[tokio::test]
async fn backend_plays_extracted_stream() {
    let root = scratch("extract-channel");
    let (ctx, _bus) = context(&root);
    let engine = Arc::new(FakeEngine::audio());
    let extractor = extractor(toolkit(80_000, 80, None, 1), &ctx);
    let service = backend(engine.clone(), &ctx).with_extractor(extractor.clone());
    let item = movie();

    let unavailable = service
        .create_stream_channel(&item, audio1(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(unavailable.is_state_error());

    let name = service.cache().cache_file_name(&item);
    service
        .cache()
        .cache(&item, Bytes::from_static(b"mkv").into(), &name, CancellationToken::new())
        .await
        .unwrap();

    let channel = service
        .create_stream_channel(&item, audio1(), CancellationToken::new())
        .await
        .unwrap();
    let artifact = extractor.extracted_path(&item, audio1()).await.unwrap().unwrap();
    match engine.last_native().source.lock().clone() {
        Some(MediaSource::File(path)) => assert_eq!(path, artifact),
        other => panic!("unexpected source {other:?}"),
    }
    assert!(channel.play().await.unwrap());

    service.shutdown().await;
    let _ = tokio::fs::remove_dir_all(&root).await;
}
