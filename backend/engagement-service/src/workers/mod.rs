pub mod cache_heartbeat;
