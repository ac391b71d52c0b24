use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default number of attempts when opening a channel.
pub const DEFAULT_OPEN_ATTEMPTS: u32 = 5;
/// Default delay between open attempts.
pub const DEFAULT_OPEN_DELAY: Duration = Duration::from_millis(100);
/// Default number of attempts per transmitted frame.
pub const DEFAULT_TX_ATTEMPTS: u32 = 3;
/// Default delay between transmit attempts.
pub const DEFAULT_TX_DELAY: Duration = Duration::from_millis(1);

type SleepFn = Arc<dyn Fn(Duration) + Send + Sync>;

/// Outcome of one attempt inside [`RetryPolicy::run`].
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// Finished; stop with this value.
    Done(T),
    /// Transient failure; try again if budget remains.
    Retry(E),
    /// Permanent failure; stop immediately.
    Fail(E),
}

/// Why [`RetryPolicy::run`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt returned [`Attempt::Retry`]; carries the last error.
    Exhausted { attempts: u32, last: E },
    /// An attempt returned [`Attempt::Fail`].
    Aborted { attempt: u32, error: E },
}

/// Bounded retry with a fixed delay between attempts.
///
/// The sleep function is injectable so tests can run without wall-clock
/// delays and count how often the policy slept.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    sleep: SleepFn,
}

impl RetryPolicy {
    /// `max_attempts` tries (at least one), sleeping `delay` between them.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            sleep: Arc::new(std::thread::sleep),
        }
    }

    /// `max_attempts` tries with no delay.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Policy used when opening a channel: 5 attempts, 100 ms apart.
    pub fn open_default() -> Self {
        Self::new(DEFAULT_OPEN_ATTEMPTS, DEFAULT_OPEN_DELAY)
    }

    /// Policy used per transmitted frame: 3 attempts, 1 ms apart.
    pub fn transmit_default() -> Self {
        Self::new(DEFAULT_TX_ATTEMPTS, DEFAULT_TX_DELAY)
    }

    /// Replace the sleep function.
    pub fn with_sleep(mut self, sleep: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleep = Arc::new(sleep);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `attempt` until it finishes, fails permanently, or the budget runs out.
    ///
    /// `attempt` receives the 1-based attempt number. The policy sleeps only
    /// between attempts, never after the last one.
    pub fn run<T, E>(
        &self,
        mut attempt: impl FnMut(u32) -> Attempt<T, E>,
    ) -> std::result::Result<T, RetryError<E>> {
        let mut n = 1;
        loop {
            match attempt(n) {
                Attempt::Done(value) => return Ok(value),
                Attempt::Fail(error) => return Err(RetryError::Aborted { attempt: n, error }),
                Attempt::Retry(last) if n >= self.max_attempts => {
                    return Err(RetryError::Exhausted { attempts: n, last });
                }
                Attempt::Retry(_) => {
                    if !self.delay.is_zero() {
                        (self.sleep)(self.delay);
                    }
                    n += 1;
                }
            }
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .finish()
    }
}
