pub mod broadcast;
mod handler;
pub mod leaderboard;
pub mod model;
pub mod pin;
pub mod scoring;
mod server;
mod session;
pub mod signaling;
mod timer;

pub use broadcast::{Audience, Connection, Outbox};
pub use handler::QuizSignalingHandler;
pub use leaderboard::{Leaderboard, LeaderboardEntry};
pub use server::{CreatedSession, QuizServer, SessionDirectory};
pub use session::{AdvanceOutcome, AnswerReceipt, JoinOutcome, SessionHandle, TeacherView};
pub use signaling::{ClientMessage, EndReason, ServerMessage, SessionSnapshot};
