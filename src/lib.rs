pub mod backend;
pub mod cli;
pub mod clock;
pub mod controller;
pub mod countdown;
pub mod logging;
pub mod modal;
pub mod poller;
pub mod settings;
pub mod terminal;
pub mod types;
pub mod view;
pub mod watcher;
