// login, signup, logout and the logged in user extractor
pub mod auth;
// health
pub mod monitoring;
// live stream creation and playback
pub mod streams;
