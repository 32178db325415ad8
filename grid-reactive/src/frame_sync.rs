use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

type FrameCallback = Box<dyn FnOnce() + Send>;

/// Defers work to an upcoming rendering opportunity.
///
/// Callbacks run in the order they were scheduled. Anything a callback
/// schedules while a frame is running waits for the following frame.
pub struct FrameScheduler {
    frame_callbacks: Arc<Mutex<VecDeque<FrameCallback>>>,
    next_frame_callbacks: Arc<Mutex<VecDeque<FrameCallback>>>,
    target_fps: Arc<RwLock<u32>>,
    frame_time: Arc<RwLock<Duration>>,
    last_frame: Arc<Mutex<Instant>>,
    frame_counter: Arc<Mutex<u64>>,
}

impl FrameScheduler {
    pub fn new(target_fps: u32) -> Self {
        let target_fps = target_fps.max(1);
        let frame_time = Duration::from_millis(1000 / target_fps as u64);

        Self {
            frame_callbacks: Arc::new(Mutex::new(VecDeque::new())),
            next_frame_callbacks: Arc::new(Mutex::new(VecDeque::new())),
            target_fps: Arc::new(RwLock::new(target_fps)),
            frame_time: Arc::new(RwLock::new(frame_time)),
            last_frame: Arc::new(Mutex::new(Instant::now())),
            frame_counter: Arc::new(Mutex::new(0)),
        }
    }

    pub fn schedule_for_next_frame<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Ok(mut callbacks) = self.next_frame_callbacks.lock() {
            callbacks.push_back(Box::new(callback));
        }
    }

    pub fn pending(&self) -> usize {
        let next = self.next_frame_callbacks.lock().map(|q| q.len()).unwrap_or(0);
        let current = self.frame_callbacks.lock().map(|q| q.len()).unwrap_or(0);
        next + current
    }

    pub fn begin_frame(&self) -> FrameContext<'_> {
        if let Ok(mut last_frame) = self.last_frame.lock() {
            *last_frame = Instant::now();
        }

        let frame = match self.frame_counter.lock() {
            Ok(mut counter) => {
                *counter += 1;
                *counter
            }
            Err(_) => 0,
        };

        // Move next frame callbacks to current frame
        if let (Ok(mut current), Ok(mut next)) = (
            self.frame_callbacks.lock(),
            self.next_frame_callbacks.lock(),
        ) {
            current.extend(next.drain(..));
        }

        FrameContext {
            scheduler: self,
            frame,
        }
    }

    pub fn end_frame(&self, context: FrameContext<'_>) -> usize {
        let mut executed = 0;
        // The lock is released before each callback so callbacks may schedule more work.
        loop {
            let callback = match self.frame_callbacks.lock() {
                Ok(mut callbacks) => callbacks.pop_front(),
                Err(_) => None,
            };
            let Some(callback) = callback else {
                break;
            };
            callback();
            executed += 1;
        }

        tracing::trace!(frame = context.frame, executed, "frame finished");
        executed
    }

    /// Runs one full frame and returns how many callbacks it executed.
    pub fn run_frame(&self) -> usize {
        let context = self.begin_frame();
        self.end_frame(context)
    }

    /// Runs frames until the queue is empty or `max_frames` have passed.
    /// Returns the number of frames run.
    pub fn run_until_idle(&self, max_frames: usize) -> usize {
        let mut frames = 0;
        while frames < max_frames && self.pending() > 0 {
            self.run_frame();
            frames += 1;
        }
        frames
    }

    pub fn set_target_fps(&self, fps: u32) {
        let fps = fps.max(1);
        if let (Ok(mut target), Ok(mut frame_time)) = (
            self.target_fps.write(),
            self.frame_time.write(),
        ) {
            *target = fps;
            *frame_time = Duration::from_millis(1000 / fps as u64);
        }
    }

    pub fn get_target_fps(&self) -> u32 {
        self.target_fps.read().map(|fps| *fps).unwrap_or(60)
    }

    pub fn get_frame_time(&self) -> Duration {
        self.frame_time.read().map(|time| *time).unwrap_or(Duration::from_millis(16))
    }

    pub fn get_frame_count(&self) -> u64 {
        self.frame_counter.lock().map(|counter| *counter).unwrap_or(0)
    }

    pub async fn wait_for_frame_time_async(&self) {
        let sleep_time = match self.last_frame.lock() {
            Ok(last_frame) => self.get_frame_time().saturating_sub(last_frame.elapsed()),
            Err(_) => Duration::ZERO,
        };
        if !sleep_time.is_zero() {
            tokio::time::sleep(sleep_time).await;
        }
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(60) // 60 FPS default
    }
}

pub struct FrameContext<'a> {
    scheduler: &'a FrameScheduler,
    frame: u64,
}

impl FrameContext<'_> {
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        self.scheduler
    }
}
