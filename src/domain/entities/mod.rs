//! Domain entity definitions.

mod conversation;
mod ids;
mod message;
mod participant;
mod profile;
mod token;

pub use conversation::{Conversation, LastMessage};
pub use ids::{ConversationId, MessageId, UserId};
pub use message::{ContentType, Message, Reaction, ReadReceipt, preview_text};
pub use participant::{ConversationRow, OtherParticipant, ParticipantUpdate, SelfParticipant};
pub use profile::UserProfile;
pub use token::AccessToken;
