pub mod monitor_routes;
