//! Completion-event side of the bridge
//!
//! - [`EventRouter`] classifies incoming [`CompletionEvent`]s
//! - [`CallbackResolver`] turns a classified event into a resume signal
//! - [`FieldPath`] addresses fields inside events and launch responses

mod event;
mod path;
mod resolver;
mod router;

pub use event::CompletionEvent;
pub use path::{FieldPath, PathError};
pub use resolver::{CallbackResolver, ResolveError};
pub use router::{ClassifiedEvent, EventRouter, MalformedEvent, RouteOutcome};
