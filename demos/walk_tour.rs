//! Simulated walk through a short tour.
//!
//! Run with: cargo run --example walk_tour

use tour_nav::geo_utils::destination_point;
use tour_nav::{
    Coordinate, LocationSource, Navigator, NavigatorConfig, Place, PlaceKind, PositionSample,
    RoutingError, SensorError, SessionEvent, SharedLocationSource, Tour, TravelProfile,
};

/// Stands in for the phone's GPS.
struct SimulatedGps;

impl LocationSource for SimulatedGps {
    fn start_watch(&mut self, high_accuracy: bool) -> Result<(), SensorError> {
        println!("   [gps] watch started (high accuracy: {})", high_accuracy);
        Ok(())
    }

    fn stop_watch(&mut self) {
        println!("   [gps] watch stopped");
    }
}

fn main() {
    let gate = Coordinate::new(12.9330, 77.5350);
    let tour = Tour::new(
        "temple",
        "Temple walk",
        vec![
            Place::new("gate", "Temple Gate", gate)
                .with_kind(PlaceKind::Start)
                .with_blurb("Carved granite gateway"),
            Place::new("well", "Step Well", destination_point(&gate, 40.0, 90.0)),
            Place::new("hall", "Pillared Hall", destination_point(&gate, 350.0, 10.0)),
            Place::new("exit", "East Exit", destination_point(&gate, 700.0, 30.0))
                .with_kind(PlaceKind::End),
        ],
    );

    let source = SharedLocationSource::new(Box::new(SimulatedGps));
    let mut nav = Navigator::new(NavigatorConfig::default(), source);
    nav.load_tours(vec![tour]);

    nav.subscribe(|event| match event {
        SessionEvent::StatusChanged { from, to } => println!("   [event] {:?} -> {:?}", from, to),
        SessionEvent::CheckedIn(e) => println!("   [event] checked in at {}", e.name),
        SessionEvent::SensorFault(e) => println!("   [event] sensor fault: {}", e),
        SessionEvent::RouteUpdated(r) => println!(
            "   [event] route with {} points (fallback: {})",
            r.polyline.len(),
            r.fallback
        ),
    });

    println!("Starting tour\n");
    nav.start("temple", TravelProfile::Walking, 0).unwrap();

    // One fix per second along a straight line from the gate towards the exit
    let exit = destination_point(&gate, 700.0, 30.0);
    for second in 0..600u64 {
        let fraction = second as f64 / 599.0;
        let position = Coordinate::new(
            gate.latitude + (exit.latitude - gate.latitude) * fraction,
            gate.longitude + (exit.longitude - gate.longitude) * fraction,
        );

        let update = nav.on_location(PositionSample::new(position, second * 1000));

        if let Some(request) = &update.route_request {
            // No directions service here: report a failure and draw the straight line
            nav.complete_route(request, Err(RoutingError::Network("offline".into())));
        }

        for event in &update.checkins {
            println!(
                "t={:>3}s  arrived at {} ({}m from center)",
                second, event.name, event.distance_at_trigger_m
            );
        }
    }

    println!("\nPending prompts:");
    for cluster in nav.clusters() {
        let names: Vec<&str> = cluster.items.iter().map(|e| e.name.as_str()).collect();
        println!("   {} -> {}", cluster.key, names.join(", "));
    }

    let keys: Vec<String> = nav.clusters().iter().map(|c| c.key.clone()).collect();
    for key in keys {
        nav.dismiss_cluster(&key);
    }
    println!("Resolved {} check-ins", nav.history().len());

    nav.stop();
}
