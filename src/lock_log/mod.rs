// Lock log interpretation
// Line classification, event dispatch, query qualifiers, replay

pub mod dispatcher;
pub mod event;
pub mod qualifier;
pub mod replay;

pub use dispatcher::*;
pub use event::*;
pub use qualifier::*;
pub use replay::*;
