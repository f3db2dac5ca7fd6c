//! Benchmark comparing the serde_json and simd-json line decoders
//!
//! Generates a synthetic feed of market change messages, compresses it with
//! bzip2 and runs the full pipeline once per backend.

use anyhow::Result;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use chimera::{melt_feed, JsonBackend, MeltConfig, TimestampZone};
use serde_json::json;
use std::io::Write;
use std::time::Instant;

const MESSAGES: usize = 20_000;
const RUNNERS: i64 = 12;

fn main() -> Result<()> {
    println!("=== Chimera Melt Benchmark ===\n");

    let mut raw = String::new();
    for i in 0..MESSAGES {
        let definition = (i % 50 == 0).then(|| {
            json!({
                "eventId": "32794452",
                "eventName": "Ascot 14th Nov",
                "name": "R3 2m Hcap Chs",
                "marketTime": "2023-11-14T13:30:00.000Z",
                "marketType": "WIN",
                "countryCode": "GB",
                "runners": (1..=RUNNERS)
                    .map(|id| json!({"id": id, "name": format!("Runner {}", id)}))
                    .collect::<Vec<_>>()
            })
        });

        let rc: Vec<_> = (1..=RUNNERS)
            .map(|id| {
                json!({
                    "id": id,
                    "ltp": 2.0 + (i as f64 % 7.0) / 10.0,
                    "bp": 1.98,
                    "lp": 2.02,
                    "bv": 100 + i,
                    "lv": 50,
                    "tv": 10_000.5
                })
            })
            .collect();

        let mut market = json!({"id": "1.219876543", "rc": rc});
        if let Some(def) = definition {
            market["marketDefinition"] = def;
        }

        let line = json!({"op": "mcm", "pt": 1700000000000i64 + i as i64 * 50, "mc": [market]});
        raw.push_str(&line.to_string());
        raw.push('\n');
        if i % 100 == 0 {
            raw.push_str("{\"op\":\"heartbeat\",\"clk\":\"AAA\"}\n");
        }
    }

    let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw.as_bytes())?;
    let compressed = encoder.finish()?;

    println!(
        "Feed: {} messages, {:.1} MB raw, {:.1} MB compressed\n",
        MESSAGES,
        raw.len() as f64 / 1_048_576.0,
        compressed.len() as f64 / 1_048_576.0
    );

    let mut timings = Vec::new();
    for backend in [JsonBackend::Serde, JsonBackend::Simd] {
        let config = MeltConfig {
            zone: TimestampZone::Utc,
            backend,
            ..MeltConfig::default()
        };

        let start = Instant::now();
        let output = melt_feed(compressed.as_slice(), &config)?;
        let elapsed = start.elapsed();

        println!("=== {:?} ===", backend);
        println!("Time: {:?}", elapsed);
        println!("Records: {}", output.records.len());
        println!(
            "Average per message: {:.2}us\n",
            elapsed.as_micros() as f64 / MESSAGES as f64
        );
        timings.push(elapsed);
    }

    let speedup = timings[0].as_secs_f64() / timings[1].as_secs_f64();
    println!("simd-json relative to serde_json: {:.2}x", speedup);

    Ok(())
}
