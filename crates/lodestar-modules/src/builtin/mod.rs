//! Modules shipped with lodestar

mod anti_spam;
mod auto_greet;
mod chat_logger;
mod freecam;
mod path_recorder;
mod route_hud;

pub use anti_spam::AntiSpam;
pub use auto_greet::AutoGreet;
pub use chat_logger::ChatLogger;
pub use freecam::Freecam;
pub use path_recorder::PathRecorder;
pub use route_hud::RouteHud;

use crate::module::Module;

/// One instance of every built-in module, in registration order
pub fn all() -> Vec<Box<dyn Module>> {
    vec![
        Box::new(ChatLogger::new()),
        Box::new(AntiSpam::new()),
        Box::new(AutoGreet::new()),
        Box::new(PathRecorder::new()),
        Box::new(RouteHud::new()),
        Box::new(Freecam::new()),
    ]
}
