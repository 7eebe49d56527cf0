//! Average speed enforcement over a binary TCP protocol.
//!
//! Cameras report number plates at fixed points on a road; the server
//! works out average speeds between pairs of sightings and sends tickets
//! to dispatchers responsible for that road. A plate gets at most one
//! ticket per day.

pub mod daemon;
