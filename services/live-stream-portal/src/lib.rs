// password hashing and signup validation
pub mod accounts;
// configuration
pub mod configuration;
// users and profiles
pub mod db;
// logging
pub mod logging;
// domain model
pub mod model;
// Mux Video API client
pub mod mux;
// routes
pub mod routes;
// service code for abstracting and running the web service
pub mod service;
// html pages
pub mod templates;
