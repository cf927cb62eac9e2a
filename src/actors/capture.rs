use actix::prelude::*;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::CONFIG;
use crate::error::DrowsewatchError;
use crate::messages::supervisor::SystemShutdown;
use crate::messages::{
    CapturedFrame, DetectorReady, InternalProcessingComplete, LatestFrameAvailable, ProcessFrame,
    StartCapture, StopCapture,
};

extern crate ffmpeg_next as ffmpeg;
use ffmpeg::codec::context::Context as CodecContext;
use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{Context as ScalingContext, Flags};
use ffmpeg::util::frame::video::Video;
use ffmpeg::Discard;

/// Decode errors tolerated within one session before the device is
/// reopened.
const MAX_SESSION_ERRORS: u32 = 10;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// CaptureActor owns the camera for the process lifetime.
///
/// The FFmpeg decode loop runs on the blocking thread pool and mails each
/// selected frame back here. The actor keeps a one-slot buffer and only
/// forwards to the detector when it has signalled ready; an unconsumed
/// buffered frame is replaced by a newer one, never queued.
#[derive(Default)]
pub struct CaptureActor {
    running: bool,
    detection_actor: Option<Addr<crate::actors::DetectionActor>>,
    supervisor_actor: Option<Addr<crate::actors::SupervisorActor>>,
    latest_frame_buffer: Option<CapturedFrame>,
    detector_ready: bool,
    shutdown_signal: Option<Arc<AtomicBool>>,
    capture_task_handle: Option<JoinHandle<()>>,
}

impl Actor for CaptureActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("CaptureActor started");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("CaptureActor stopped");

        if let Some(signal) = &self.shutdown_signal {
            signal.store(true, Ordering::Relaxed);
        }

        if let Some(task_handle) = self.capture_task_handle.take() {
            info!("Aborting capture task during actor shutdown");
            task_handle.abort();
        }
    }
}

impl CaptureActor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actors(
        detection_actor: Addr<crate::actors::DetectionActor>,
        supervisor_actor: Addr<crate::actors::SupervisorActor>,
    ) -> Self {
        Self {
            detection_actor: Some(detection_actor),
            supervisor_actor: Some(supervisor_actor),
            ..Default::default()
        }
    }

    /// Starts the FFmpeg capture task on the blocking thread pool.
    fn start_capture_task(
        &mut self,
        ctx: &mut Context<Self>,
        source: String,
        init_signal: oneshot::Sender<Result<(), DrowsewatchError>>,
    ) {
        let own_addr = ctx.address();

        let shutdown_arc = Arc::new(AtomicBool::new(false));
        self.shutdown_signal = Some(shutdown_arc.clone());

        self.running = true;

        info!(target: "capture", "Spawning capture task in blocking thread pool");

        let own_addr_for_task = own_addr.clone();
        let own_addr_for_completion = own_addr;

        let capture_task = async move {
            let capture_result = tokio::task::spawn_blocking(move || {
                Self::capture_frames_blocking(
                    source,
                    own_addr_for_task,
                    shutdown_arc,
                    Some(init_signal),
                )
            })
            .await;

            let final_result = match capture_result {
                Ok(result) => result,
                Err(join_error) => {
                    error!(target: "capture", "Capture task panicked or was cancelled: {}", join_error);
                    Err(DrowsewatchError::Other(format!(
                        "Capture task failed: {}",
                        join_error
                    )))
                }
            };

            own_addr_for_completion.do_send(InternalProcessingComplete {
                result: final_result,
            });
        };

        let task_handle = actix::spawn(capture_task);
        self.capture_task_handle = Some(task_handle);
    }

    /// Camera loop. FFmpeg initialization failure is a startup error and is
    /// reported through `init_signal`; everything after that is transient —
    /// a dead or missing device is retried for the process lifetime.
    fn capture_frames_blocking(
        source: String,
        capture_actor_addr: Addr<CaptureActor>,
        shutdown_signal: Arc<AtomicBool>,
        init_signal: Option<oneshot::Sender<Result<(), DrowsewatchError>>>,
    ) -> Result<(), DrowsewatchError> {
        info!(target: "capture", "Capture task started for {}", source);

        let mut init_sender = init_signal;
        let send_init_status =
            |sender: Option<oneshot::Sender<Result<(), DrowsewatchError>>>,
             result: Result<(), DrowsewatchError>| {
                if let Some(s) = sender {
                    if s.send(result).is_err() {
                        error!(target: "capture", "Failed to send init status, receiver dropped");
                    }
                }
            };

        if let Err(e) = ffmpeg::init() {
            error!(target: "capture", "FFmpeg init failed: {}", e);
            let err = DrowsewatchError::from(e);
            send_init_status(init_sender.take(), Err(err.clone_for_error_reporting()));
            return Err(err);
        }
        ffmpeg::log::set_level(ffmpeg::log::Level::Quiet);
        send_init_status(init_sender.take(), Ok(()));

        let mut frame_index = 0u64;
        loop {
            if shutdown_signal.load(Ordering::Relaxed) {
                info!(target: "capture", "Shutdown signal received, stopping capture");
                break;
            }

            match Self::run_capture_session(
                &source,
                &capture_actor_addr,
                &shutdown_signal,
                &mut frame_index,
            ) {
                Ok(()) => {
                    info!(target: "capture", "Camera stream ended after {} frames, reopening", frame_index)
                }
                Err(e) => error!(target: "capture", "Capture session failed: {}, reopening", e),
            }

            if shutdown_signal.load(Ordering::Relaxed) {
                break;
            }
            std::thread::sleep(RECONNECT_DELAY);
        }

        info!(target: "capture", "Capture task finished after {} frames", frame_index);
        Ok(())
    }

    /// One open-decode-until-failure pass over the device.
    fn run_capture_session(
        source: &str,
        capture_actor_addr: &Addr<CaptureActor>,
        shutdown_signal: &Arc<AtomicBool>,
        frame_index: &mut u64,
    ) -> Result<(), DrowsewatchError> {
        let mut ictx = input(source)?;

        let input_stream = ictx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| {
                DrowsewatchError::Other(format!("Could not find video stream in {}", source))
            })?;
        let video_stream_index = input_stream.index();

        let mut decoder = CodecContext::from_parameters(input_stream.parameters())?
            .decoder()
            .video()?;

        if CONFIG.camera.only_keyframes {
            decoder.skip_frame(Discard::NonKey);
        }

        let mut scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            Flags::BILINEAR,
        )?;

        let mut error_count = 0u32;
        let min_interval = Duration::from_millis(CONFIG.camera.frame_interval_ms);
        let frame_stride = CONFIG.camera.frame_stride.max(1);

        info!(target: "capture", "Camera open, starting frame loop");

        for (stream, packet) in ictx.packets() {
            if shutdown_signal.load(Ordering::Relaxed) {
                return Ok(());
            }
            if stream.index() != video_stream_index {
                continue;
            }

            // A bad read skips the tick; only a burst of them ends the
            // session so the device gets reopened.
            if let Err(e) = decoder.send_packet(&packet) {
                error_count += 1;
                error!(target: "capture", "Failed to send packet to decoder (error {}/{}): {}", error_count, MAX_SESSION_ERRORS, e);
                if error_count >= MAX_SESSION_ERRORS {
                    return Err(DrowsewatchError::from(e));
                }
                continue;
            }

            let mut decoded = Video::empty();
            while decoder.receive_frame(&mut decoded).is_ok() {
                if shutdown_signal.load(Ordering::Relaxed) {
                    return Ok(());
                }

                *frame_index += 1;
                if *frame_index % frame_stride != 0 {
                    continue;
                }

                let frame_start_time = std::time::Instant::now();

                let mut rgb_frame = Video::empty();
                match scaler.run(&decoded, &mut rgb_frame) {
                    Ok(_) => {
                        error_count = 0;
                        let frame = CapturedFrame {
                            data: Self::packed_rgb(&rgb_frame),
                            width: rgb_frame.width(),
                            height: rgb_frame.height(),
                            timestamp: Utc::now(),
                            frame_index: *frame_index,
                        };
                        debug!(target: "capture", "Captured frame {}", frame.frame_index);
                        capture_actor_addr.do_send(LatestFrameAvailable { frame });

                        // Pace the loop so a fast camera doesn't turn into
                        // a busy spin.
                        let processing_time = frame_start_time.elapsed();
                        if processing_time < min_interval {
                            std::thread::sleep(min_interval - processing_time);
                        }
                    }
                    Err(e) => {
                        error_count += 1;
                        error!(target: "capture", "Failed to scale frame {} (error {}/{}): {}", frame_index, error_count, MAX_SESSION_ERRORS, e);
                        if error_count >= MAX_SESSION_ERRORS {
                            return Err(DrowsewatchError::from(e));
                        }
                    }
                }
            }
        }

        if let Err(e) = decoder.send_eof() {
            error!(target: "capture", "Failed to send EOF to decoder: {}", e);
        }

        Ok(())
    }

    /// Copies one scaled frame into a packed RGB24 buffer, dropping FFmpeg's
    /// row padding.
    fn packed_rgb(frame: &Video) -> Vec<u8> {
        let row_bytes = frame.width() as usize * 3;
        let stride = frame.stride(0);
        let data = frame.data(0);
        if stride == row_bytes {
            return data.to_vec();
        }
        let mut packed = Vec::with_capacity(row_bytes * frame.height() as usize);
        for row in 0..frame.height() as usize {
            let start = row * stride;
            packed.extend_from_slice(&data[start..start + row_bytes]);
        }
        packed
    }

    /// Forwards the buffered frame when the detector is free. A busy
    /// detector leaves the frame in the one-slot buffer where a newer one
    /// may replace it.
    fn try_send_frame_to_detector(&mut self, ctx: &mut Context<Self>) {
        if !self.detector_ready {
            if let Some(frame) = &self.latest_frame_buffer {
                debug!(
                    "Detector busy, frame {} waits in the buffer",
                    frame.frame_index
                );
            }
            return;
        }

        let Some(frame) = self.latest_frame_buffer.take() else {
            debug!("Detector ready, no frame buffered");
            return;
        };

        if let Some(ref detection_actor) = self.detection_actor {
            let frame_index = frame.frame_index;
            detection_actor.do_send(ProcessFrame {
                frame,
                reply_to: ctx.address(),
            });
            self.detector_ready = false;
            debug!("Sent frame {} to detector", frame_index);
        } else {
            debug!("Detection actor not available, dropping frame");
        }
    }
}

// =============================================================================
// MESSAGE HANDLERS
// =============================================================================

impl Handler<StartCapture> for CaptureActor {
    type Result = ResponseFuture<Result<(), DrowsewatchError>>;

    fn handle(&mut self, msg: StartCapture, ctx: &mut Self::Context) -> Self::Result {
        info!("Received StartCapture for: {}", msg.source);

        if self.running {
            info!("Stopping existing capture before starting a new one");
            if let Some(signal) = &self.shutdown_signal {
                signal.store(true, Ordering::Relaxed);
            }
            if let Some(task_handle) = self.capture_task_handle.take() {
                task_handle.abort();
            }
            self.shutdown_signal = None;
        }

        self.running = true;
        self.latest_frame_buffer = None;
        self.detector_ready = true;

        let (tx, rx) = oneshot::channel::<Result<(), DrowsewatchError>>();
        self.start_capture_task(ctx, msg.source, tx);

        let actor_address = ctx.address();

        Box::pin(async move {
            match rx.await {
                Ok(Ok(())) => {
                    info!("Capture initialization reported success");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!("Capture initialization reported failure: {}", e);
                    actor_address.do_send(CaptureInitializationFailed);
                    Err(e)
                }
                Err(_channel_error) => {
                    error!("Capture initialization status channel failed (sender dropped)");
                    actor_address.do_send(CaptureInitializationFailed);
                    Err(DrowsewatchError::Other(
                        "Capture init status channel failed".to_string(),
                    ))
                }
            }
        })
    }
}

#[derive(Message)]
#[rtype(result = "()")]
struct CaptureInitializationFailed;

impl Handler<CaptureInitializationFailed> for CaptureActor {
    type Result = ();

    fn handle(
        &mut self,
        _msg: CaptureInitializationFailed,
        _ctx: &mut Context<Self>,
    ) -> Self::Result {
        error!("Capture failed to initialize, resetting state");
        self.running = false;

        if let Some(signal) = self.shutdown_signal.take() {
            signal.store(true, Ordering::Relaxed);
        }
        if let Some(task_handle) = self.capture_task_handle.take() {
            task_handle.abort();
        }
    }
}

impl Handler<StopCapture> for CaptureActor {
    type Result = Result<(), DrowsewatchError>;

    fn handle(&mut self, _msg: StopCapture, _ctx: &mut Self::Context) -> Self::Result {
        info!("Stopping capture");
        self.running = false;
        self.latest_frame_buffer = None;
        self.detector_ready = true;

        if let Some(signal) = &self.shutdown_signal {
            signal.store(true, Ordering::Relaxed);
        }
        if let Some(task_handle) = self.capture_task_handle.take() {
            task_handle.abort();
        }

        self.shutdown_signal = None;

        Ok(())
    }
}

impl Handler<LatestFrameAvailable> for CaptureActor {
    type Result = ();

    fn handle(&mut self, msg: LatestFrameAvailable, ctx: &mut Context<Self>) -> Self::Result {
        debug!(target: "capture", "Received frame {}", msg.frame.frame_index);
        // Drop-oldest: an unconsumed frame is simply replaced.
        self.latest_frame_buffer = Some(msg.frame);
        self.try_send_frame_to_detector(ctx);
    }
}

impl Handler<DetectorReady> for CaptureActor {
    type Result = ();

    fn handle(&mut self, _msg: DetectorReady, ctx: &mut Context<Self>) -> Self::Result {
        debug!(target: "capture", "Detector is ready for the next frame");
        self.detector_ready = true;
        self.try_send_frame_to_detector(ctx);
    }
}

impl Handler<InternalProcessingComplete> for CaptureActor {
    type Result = ();

    fn handle(&mut self, msg: InternalProcessingComplete, _ctx: &mut Context<Self>) -> Self::Result {
        info!(target: "capture", "Capture task reported completion");
        self.running = false;
        self.capture_task_handle = None;

        if let Err(e) = msg.result {
            // Only FFmpeg initialization gets here; device trouble is
            // retried inside the task.
            error!(target: "capture", "Capture task failed fatally: {}. Requesting system shutdown.", e);
            if let Some(sup_actor) = &self.supervisor_actor {
                sup_actor.do_send(SystemShutdown);
            } else {
                error!(target: "capture", "Supervisor actor not available to request shutdown");
            }
        }
    }
}

#[cfg(test)]
#[derive(Message)]
#[rtype(result = "(bool, Option<u64>)")]
pub struct GetBufferState;

#[cfg(test)]
impl Handler<GetBufferState> for CaptureActor {
    type Result = MessageResult<GetBufferState>;

    fn handle(&mut self, _msg: GetBufferState, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult((
            self.detector_ready,
            self.latest_frame_buffer.as_ref().map(|f| f.frame_index),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame(index: u64) -> CapturedFrame {
        CapturedFrame {
            data: vec![0u8; 16 * 16 * 3],
            width: 16,
            height: 16,
            timestamp: Utc::now(),
            frame_index: index,
        }
    }

    #[actix::test]
    async fn frames_buffer_while_no_detector_is_attached() {
        let actor = CaptureActor::new().start();
        actor.do_send(LatestFrameAvailable {
            frame: test_frame(1),
        });

        let (ready, buffered) = actor.send(GetBufferState).await.unwrap();
        assert!(!ready);
        assert_eq!(buffered, Some(1));
    }

    #[actix::test]
    async fn newer_frame_replaces_an_unconsumed_one() {
        let actor = CaptureActor::new().start();
        actor.do_send(LatestFrameAvailable {
            frame: test_frame(1),
        });
        actor.do_send(LatestFrameAvailable {
            frame: test_frame(2),
        });

        let (_, buffered) = actor.send(GetBufferState).await.unwrap();
        assert_eq!(buffered, Some(2));
    }

    #[actix::test]
    async fn detector_ready_without_detection_actor_drops_the_frame() {
        let actor = CaptureActor::new().start();
        actor.do_send(LatestFrameAvailable {
            frame: test_frame(1),
        });
        actor.do_send(DetectorReady);

        let (ready, buffered) = actor.send(GetBufferState).await.unwrap();
        assert!(ready);
        assert_eq!(buffered, None);
    }

    #[actix::test]
    async fn stop_capture_clears_the_buffer() {
        let actor = CaptureActor::new().start();
        actor.do_send(LatestFrameAvailable {
            frame: test_frame(7),
        });
        actor.send(StopCapture).await.unwrap().unwrap();

        let (ready, buffered) = actor.send(GetBufferState).await.unwrap();
        assert!(ready);
        assert_eq!(buffered, None);
    }
}
