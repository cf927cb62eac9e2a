use actix::prelude::*;
use bytes::Bytes;
use chrono::{DateTime, Local, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::alert::{AlertCommand, AlertStateMachine};
use crate::config::CONFIG;
use crate::error::DrowsewatchError;
use crate::messages::telemetry::StatusUpdate;
use crate::messages::{
    ClearHistory, DetectorReady, GetMonitorStats, MonitorStats, ProcessFrame, PublishStatus,
    SetAlarm,
};
use crate::utils::detection_utils::{target_present, DetectionResult, DetectionService};
use crate::utils::event_store::{EventStore, LogEntry};
use crate::utils::image_utils;

#[cfg(test)]
use crate::utils::detection_utils::MockDetectionService;

/// DetectionActor runs the per-frame pipeline and is the single writer for
/// all episode, counter and event-store state.
///
/// Per frame: detector sidecar call, `present` signal, one state-machine
/// tick, command side effects (alarm, episode persistence), annotation,
/// and publication of the encoded frame to the stream subscribers.
pub struct DetectionActor {
    detection_service: Arc<DetectionService>,
    alert: AlertStateMachine,
    event_store: EventStore,
    alarm: Addr<crate::actors::AlarmActor>,
    telemetry: Addr<crate::actors::TelemetryActor>,
    frame_tx: broadcast::Sender<Bytes>,
    frames_processed: u64,
    last_detection_time: i64,
    #[cfg(test)]
    mock_service: MockDetectionService,
}

impl Actor for DetectionActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("DetectionActor started");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("DetectionActor stopped");
    }
}

impl DetectionActor {
    pub fn new(
        alarm: Addr<crate::actors::AlarmActor>,
        telemetry: Addr<crate::actors::TelemetryActor>,
        event_store: EventStore,
        frame_tx: broadcast::Sender<Bytes>,
    ) -> Self {
        let threshold = std::time::Duration::from_secs_f64(CONFIG.alert.debounce_seconds);
        Self {
            detection_service: Arc::new(DetectionService::new()),
            alert: AlertStateMachine::new(threshold),
            event_store,
            alarm,
            telemetry,
            frame_tx,
            frames_processed: 0,
            last_detection_time: 0,
            #[cfg(test)]
            mock_service: MockDetectionService::new(),
        }
    }

    #[cfg(test)]
    pub fn with_mock(mut self, mock: MockDetectionService) -> Self {
        self.mock_service = mock;
        self
    }

    /// Applies one tick's worth of observations: steps the machine and
    /// executes whatever it asks for. Runs inside the actor context, so
    /// every mutation stays on the single writer.
    fn apply_tick(
        &mut self,
        image: &image::DynamicImage,
        detections: &[DetectionResult],
        now: DateTime<Utc>,
    ) {
        let present = target_present(
            detections,
            &CONFIG.detection.target_label,
            CONFIG.detection.minimum_confidence,
        );
        if present {
            self.last_detection_time = now.timestamp();
        }

        for command in self.alert.tick(present, now) {
            match command {
                AlertCommand::AlarmOn => {
                    info!("Target condition detected, raising alarm");
                    self.alarm.do_send(SetAlarm { on: true });
                }
                AlertCommand::AlarmOff => {
                    info!("Target condition gone, lowering alarm");
                    self.alarm.do_send(SetAlarm { on: false });
                }
                AlertCommand::ConfirmEpisode => {
                    self.persist_episode(image, detections, now);
                }
            }
        }

        let note = present.then(|| {
            format!(
                "Drowsiness detected at {}",
                now.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            )
        });
        self.telemetry.do_send(PublishStatus {
            update: StatusUpdate {
                status: self.alert.status(),
                total_confirmed: self.alert.counters().total_confirmed,
                note,
            },
        });
    }

    /// Writes the confirmed episode's snapshot and log line. A storage
    /// failure is logged and the loop keeps running; the episode stays
    /// confirmed either way.
    fn persist_episode(
        &mut self,
        image: &image::DynamicImage,
        detections: &[DetectionResult],
        now: DateTime<Utc>,
    ) {
        info!(
            "Episode confirmed, total so far: {}",
            self.alert.counters().total_confirmed
        );

        let mut snapshot = image.clone();
        image_utils::draw_detections(&mut snapshot, detections);

        let entry = LogEntry::from_timestamp(now.with_timezone(&Local));
        match self.event_store.append(&entry, &snapshot) {
            Ok(()) => self.alert.note_snapshot(entry.filename.clone()),
            Err(err) => error!("Failed to persist confirmed episode: {}", err),
        }
    }

    fn publish_frame(
        &self,
        mut image: image::DynamicImage,
        detections: &[DetectionResult],
        now: DateTime<Utc>,
    ) {
        image_utils::draw_detections(&mut image, detections);
        image_utils::draw_timestamp(&mut image, now.with_timezone(&Local));
        match image_utils::encode_jpeg(&image) {
            // An error here only means nobody is subscribed.
            Ok(jpeg) => {
                let _ = self.frame_tx.send(Bytes::from(jpeg));
            }
            Err(err) => warn!("Failed to encode frame for streaming: {}", err),
        }
    }
}

impl Handler<ProcessFrame> for DetectionActor {
    type Result = ResponseActFuture<Self, Result<(), DrowsewatchError>>;

    fn handle(&mut self, msg: ProcessFrame, _ctx: &mut Self::Context) -> Self::Result {
        debug!("Processing frame {}", msg.frame.frame_index);

        let frame = msg.frame;
        let reply_to = msg.reply_to;

        #[cfg(test)]
        let service = self.mock_service.clone();
        #[cfg(not(test))]
        let service = self.detection_service.clone();

        Box::pin(
            async move {
                let image = image_utils::frame_to_image(&frame.data, frame.width, frame.height)?;
                let jpeg = image_utils::encode_jpeg(&image)?;
                let detections = service.do_detection(&jpeg).await;
                Ok::<_, DrowsewatchError>((image, detections, frame.timestamp))
            }
            .into_actor(self)
            .map(move |result, actor, _ctx| {
                let outcome = match result {
                    Ok((image, Ok(detections), timestamp)) => {
                        actor.frames_processed += 1;
                        actor.apply_tick(&image, &detections, timestamp);
                        actor.publish_frame(image, &detections, timestamp);
                        Ok(())
                    }
                    Ok((image, Err(err), timestamp)) => {
                        // A detector hiccup skips the tick: the machine
                        // does not see a fabricated "absent" signal, and
                        // the stream still gets the raw frame.
                        error!("Detection failed, skipping tick: {}", err);
                        actor.publish_frame(image, &[], timestamp);
                        Err(err)
                    }
                    Err(err) => {
                        error!("Frame conversion failed: {}", err);
                        Err(err)
                    }
                };
                reply_to.do_send(DetectorReady);
                outcome
            }),
        )
    }
}

impl Handler<GetMonitorStats> for DetectionActor {
    type Result = Result<MonitorStats, DrowsewatchError>;

    fn handle(&mut self, _msg: GetMonitorStats, _ctx: &mut Self::Context) -> Self::Result {
        Ok(MonitorStats {
            total_confirmed: self.alert.counters().total_confirmed,
            status: self.alert.status(),
            frames_processed: self.frames_processed,
            last_detection_time: self.last_detection_time,
        })
    }
}

impl Handler<ClearHistory> for DetectionActor {
    type Result = Result<(), DrowsewatchError>;

    fn handle(&mut self, _msg: ClearHistory, _ctx: &mut Self::Context) -> Self::Result {
        let result = self.event_store.clear();
        // Counter reset is unconditional, even when the deletion was only
        // partial; the store reports what it could not remove.
        self.alert.reset_counters();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::{AlarmActor, TelemetryActor};
    use crate::actuator::ConsoleActuator;
    use crate::messages::capture::CapturedFrame;
    use crate::messages::GetAlarmEngaged;
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct Harness {
        detection: Addr<DetectionActor>,
        capture: Addr<crate::actors::CaptureActor>,
        alarm: Addr<AlarmActor>,
        frame_rx: broadcast::Receiver<Bytes>,
        store: EventStore,
        _dir: TempDir,
    }

    fn harness(mock: MockDetectionService) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::new(dir.path().join("log.txt"), dir.path().join("snapshots"));
        let alarm = AlarmActor::new(ConsoleActuator::default().into()).start();
        let telemetry = TelemetryActor::new(vec![]).start();
        let (frame_tx, frame_rx) = broadcast::channel(16);
        let detection =
            DetectionActor::new(alarm.clone(), telemetry, store.clone(), frame_tx)
                .with_mock(mock)
                .start();
        let capture = crate::actors::CaptureActor::new().start();
        Harness {
            detection,
            capture,
            alarm,
            frame_rx,
            store,
            _dir: dir,
        }
    }

    fn drowsy_detection() -> DetectionResult {
        DetectionResult {
            r#box: [8, 8, 40, 40],
            cls: 0,
            cls_name: "drowsy".to_string(),
            conf: 85,
        }
    }

    fn frame_at(index: u64, millis: i64) -> CapturedFrame {
        CapturedFrame {
            data: vec![64u8; 64 * 48 * 3],
            width: 64,
            height: 48,
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_000 + millis).unwrap(),
            frame_index: index,
        }
    }

    async fn feed(harness: &Harness, index: u64, millis: i64) {
        harness
            .detection
            .send(ProcessFrame {
                frame: frame_at(index, millis),
                reply_to: harness.capture.clone(),
            })
            .await
            .unwrap()
            .unwrap();
    }

    #[actix::test]
    async fn fresh_actor_reports_zeroed_stats() {
        let harness = harness(MockDetectionService::new());
        let stats = harness.detection.send(GetMonitorStats).await.unwrap().unwrap();
        assert_eq!(stats.total_confirmed, 0);
        assert_eq!(stats.frames_processed, 0);
        assert_eq!(stats.status, crate::alert::AlertStatus::Normal);
    }

    #[actix::test]
    async fn empty_detections_keep_the_machine_idle() {
        let harness = harness(MockDetectionService::new());
        for i in 0..5 {
            feed(&harness, i, i as i64 * 100).await;
        }
        let stats = harness.detection.send(GetMonitorStats).await.unwrap().unwrap();
        assert_eq!(stats.frames_processed, 5);
        assert_eq!(stats.total_confirmed, 0);
        assert!(!harness.alarm.send(GetAlarmEngaged).await.unwrap());
    }

    #[actix::test]
    async fn sustained_detection_confirms_one_episode_with_one_snapshot() {
        let mock =
            MockDetectionService::new().with_mock_detections(vec![drowsy_detection()]);
        let harness = harness(mock);

        // 4 seconds of continuous detection at 10fps, T = 3s.
        for i in 0..40 {
            feed(&harness, i, i as i64 * 100).await;
        }

        let stats = harness.detection.send(GetMonitorStats).await.unwrap().unwrap();
        assert_eq!(stats.total_confirmed, 1);
        assert_eq!(stats.status, crate::alert::AlertStatus::Alert);
        assert!(harness.alarm.send(GetAlarmEngaged).await.unwrap());

        let entries = harness.store.read_all();
        assert_eq!(entries.len(), 1);
        assert!(harness.store.snapshot_path(&entries[0].filename).exists());
    }

    #[actix::test]
    async fn interrupted_detection_never_confirms() {
        let mock =
            MockDetectionService::new().with_mock_detections(vec![drowsy_detection()]);
        let harness = harness(mock.clone());

        for i in 0..25 {
            feed(&harness, i, i as i64 * 100).await;
        }
        // One clean frame resets the machine.
        mock.set_detections(vec![]);
        feed(&harness, 25, 2_500).await;
        // Detections resume, but 2.5 more seconds are not enough for the
        // restarted timer.
        mock.set_detections(vec![drowsy_detection()]);
        for i in 26..51 {
            feed(&harness, i, i as i64 * 100).await;
        }

        let stats = harness.detection.send(GetMonitorStats).await.unwrap().unwrap();
        assert_eq!(stats.total_confirmed, 0);
        assert!(harness.store.read_all().is_empty());
    }

    #[actix::test]
    async fn detector_failure_skips_the_tick() {
        let mock = MockDetectionService::new().with_failure(true);
        let harness = harness(mock);

        let result = harness
            .detection
            .send(ProcessFrame {
                frame: frame_at(0, 0),
                reply_to: harness.capture.clone(),
            })
            .await
            .unwrap();
        assert!(result.is_err());

        let stats = harness.detection.send(GetMonitorStats).await.unwrap().unwrap();
        assert_eq!(stats.frames_processed, 0);
        assert_eq!(stats.total_confirmed, 0);
    }

    #[actix::test]
    async fn processed_frames_reach_stream_subscribers() {
        let mut harness = harness(MockDetectionService::new());
        feed(&harness, 0, 0).await;
        let jpeg = harness.frame_rx.try_recv().unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[actix::test]
    async fn clear_history_empties_store_and_counters() {
        let mock =
            MockDetectionService::new().with_mock_detections(vec![drowsy_detection()]);
        let harness = harness(mock);
        for i in 0..35 {
            feed(&harness, i, i as i64 * 100).await;
        }
        assert_eq!(harness.store.read_all().len(), 1);

        harness.detection.send(ClearHistory).await.unwrap().unwrap();

        let stats = harness.detection.send(GetMonitorStats).await.unwrap().unwrap();
        assert_eq!(stats.total_confirmed, 0);
        assert!(harness.store.read_all().is_empty());
    }
}
