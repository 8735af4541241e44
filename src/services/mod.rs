pub mod notifier;
pub mod refresh;
