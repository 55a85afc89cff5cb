pub mod clock;
pub mod session_clock;

pub use clock::{Clock, ManualClock, SystemClock};
pub use session_clock::{FinalMinuteWindow, SessionClock, SessionPhase, SessionState};
