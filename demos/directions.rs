//! Fetch a walking route from the Mapbox Directions API.
//!
//! Run with: MAPBOX_TOKEN=... cargo run --example directions --features http

use std::time::Instant;

use tour_nav::{Coordinate, DirectionsClient, TravelProfile};

#[tokio::main]
async fn main() {
    let token = match std::env::var("MAPBOX_TOKEN") {
        Ok(t) => t,
        Err(_) => {
            eprintln!("Set MAPBOX_TOKEN to run this example");
            return;
        }
    };

    let waypoints = vec![
        Coordinate::new(12.9330, 77.5350),
        Coordinate::new(12.9362, 77.5371),
        Coordinate::new(12.9391, 77.5402),
    ];

    let client = DirectionsClient::new(&token).unwrap();

    for profile in [TravelProfile::Walking, TravelProfile::Cycling, TravelProfile::Driving] {
        let start = Instant::now();
        match client.fetch_route(&waypoints, profile).await {
            Ok(route) => println!(
                "{:<8} {:>6.0}m {:>6.0}s  {} points  ({:?})",
                profile.as_str(),
                route.distance_m,
                route.duration_s,
                route.polyline.len(),
                start.elapsed()
            ),
            Err(e) => println!("{:<8} failed: {}", profile.as_str(), e),
        }
    }
}
