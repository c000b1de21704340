//! Take readings from an attached instrument over HID
//!
//! Run with: cargo run --example measure_hid --features hid -- [emissive|transmissive|reflective]

use std::io::{self, BufRead};

use i1d3::{CalibrationKind, Colorimeter, Geometry, HidTransport, MeasureMode};

fn main() -> i1d3::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let geometry: Geometry = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "emissive".to_string())
        .parse()?;

    let colorimeter = Colorimeter::new(HidTransport::open()?).with_setup_prompt(|kind: CalibrationKind| {
        match kind {
            CalibrationKind::White => println!("Place the instrument on the white reference and press Enter"),
            CalibrationKind::Dark => println!("Cap the sensor and press Enter"),
        }
        io::stdin().lock().lines().next().is_some()
    });

    let info = match colorimeter.attach() {
        Ok(info) => info,
        Err(i1d3::Error::UnknownKey(name)) => {
            eprintln!("{name:?} is locked; configure an unlock table and responder");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    println!("✓ Attached: {}", info);

    colorimeter.set_geometry(geometry);

    if geometry != Geometry::Reflective {
        colorimeter.calibrate_dark()?;
        println!("Uncap the sensor, place it on the target and press Enter");
        let _ = io::stdin().lock().lines().next();
    }

    if geometry == Geometry::Emissive {
        let refresh = colorimeter.estimate_refresh()?;
        println!("✓ Refresh: {}", refresh);
    }

    for i in 1..=3 {
        let hz = colorimeter.measure(MeasureMode::Adaptive)?;
        println!("Reading {}: R {:.3} Hz  G {:.3} Hz  B {:.3} Hz", i, hz[0], hz[1], hz[2]);
    }

    Ok(())
}
