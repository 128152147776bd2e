//! Wire-format laws over generated frames, plus configuration round-trips.
//!
//! The codec's unit tests pin the exact byte layout; these tests sweep
//! randomized field combinations through the round-trip laws the format
//! guarantees: `parse(serialize(P)) == P` and
//! `serialize(parse(B)) == B`, with `serialized_size` always matching the
//! written length.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use hivelink_engine::{
    Engine, EngineConfig, Frame, GpsLocation, Host, SendError, wire,
};

struct NullHost;

impl Host for NullHost {
    fn send(&mut self, _frame: &[u8]) -> Result<(), SendError> {
        Ok(())
    }
}

fn random_gps(rng: &mut StdRng) -> GpsLocation {
    if rng.gen_bool(0.5) {
        GpsLocation::new(
            rng.gen_range(-10_000.0..10_000.0),
            rng.gen_range(-10_000.0..10_000.0),
            rng.gen_range(-100.0..100.0),
        )
    } else {
        GpsLocation::invalid()
    }
}

fn random_path(rng: &mut StdRng, max_hops: usize) -> wire::HopPath {
    let len = rng.gen_range(1..=max_hops);
    let mut path = wire::HopPath::new();
    for i in 0..len {
        path.push(rng.gen_range(1..=u32::MAX - 1) ^ i as u32).unwrap();
    }
    path
}

fn random_discovery(rng: &mut StdRng) -> wire::DiscoveryFrame {
    let path = random_path(rng, 50);
    wire::DiscoveryFrame {
        is_clusterhead: rng.gen_bool(0.3),
        sender_id: path[0],
        ttl: rng.gen_range(0..=255),
        path,
        gps: random_gps(rng),
    }
}

fn random_election(rng: &mut StdRng) -> wire::ElectionFrame {
    let discovery = random_discovery(rng);
    let history_len = discovery.path.len().saturating_sub(1);
    let mut history = wire::PdsfHistory::new();
    for _ in 0..history_len {
        history.push(rng.gen_range(0..50)).unwrap();
    }
    wire::ElectionFrame {
        discovery: wire::DiscoveryFrame {
            is_clusterhead: true,
            ..discovery
        },
        class_id: rng.r#gen(),
        direct_connections: rng.gen_range(0..200),
        pdsf: rng.r#gen(),
        score: rng.gen_range(0.0..=1.0),
        hash: rng.r#gen(),
        pdsf_history: history,
    }
}

#[test]
fn generated_frames_round_trip() {
    let mut rng = StdRng::seed_from_u64(20_240_817);
    let mut buf = [0u8; wire::MAX_FRAME_LEN];

    for i in 0..500 {
        let frame = if i % 2 == 0 {
            Frame::Discovery(random_discovery(&mut rng))
        } else {
            Frame::Election(random_election(&mut rng))
        };

        let n = frame.serialize(&mut buf).unwrap();
        assert_eq!(n, frame.serialized_size());

        let parsed = Frame::parse(&buf[..n]).unwrap();
        assert_eq!(parsed, frame);

        // Re-serializing the parsed frame reproduces the buffer exactly.
        let mut again = [0u8; wire::MAX_FRAME_LEN];
        let m = parsed.serialize(&mut again).unwrap();
        assert_eq!(&buf[..n], &again[..m]);
    }
}

#[test]
fn truncation_of_any_generated_frame_never_panics() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut buf = [0u8; wire::MAX_FRAME_LEN];

    for _ in 0..100 {
        let frame = Frame::Election(random_election(&mut rng));
        let n = frame.serialize(&mut buf).unwrap();
        // Every proper prefix must fail cleanly, never panic.
        let cut = rng.gen_range(0..n);
        assert!(Frame::parse(&buf[..cut]).is_err());
    }
}

#[test]
fn crowding_estimate_from_noisy_samples() {
    // Samples jittered around -45 dBm must land the crowding factor near
    // the exact-mean value of 0.9.
    let mut rng = StdRng::seed_from_u64(99);
    let noise = Normal::new(-45.0f64, 2.0).unwrap();

    let mut engine = Engine::new(EngineConfig::new(5), NullHost).unwrap();
    engine.begin_noisy_window(0, 10_000);
    for i in 0..100u64 {
        let rssi = noise.sample(&mut rng).round().clamp(-128.0, 0.0) as i8;
        let bytes = {
            let sender = 1_000 + i as u32;
            let frame = Frame::Discovery(wire::DiscoveryFrame {
                is_clusterhead: false,
                sender_id: sender,
                ttl: 10,
                path: wire::HopPath::from_slice(&[sender]).unwrap(),
                gps: GpsLocation::invalid(),
            });
            let mut buf = [0u8; wire::MAX_FRAME_LEN];
            let n = frame.serialize(&mut buf).unwrap();
            buf[..n].to_vec()
        };
        let _ = engine.receive(&bytes, rssi, i * 10);
    }
    engine.close_noisy_window();

    let crowding = engine.snapshot().crowding_factor;
    assert!(
        (0.85..=0.95).contains(&crowding),
        "crowding {crowding} strayed from 0.9"
    );
}

#[test]
fn config_survives_json_round_trip() {
    let mut config = EngineConfig::new(31);
    config.slot_duration_ms = 250;
    config.thresholds.min_neighbors = 4;
    config.weights.direct = 0.5;
    config.weights.cn_ratio = 0.15;

    let json = serde_json::to_string(&config).unwrap();
    let back: EngineConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.node_id, 31);
    assert_eq!(back.slot_duration_ms, 250);
    assert_eq!(back.thresholds.min_neighbors, 4);
    assert_eq!(back.weights.direct, 0.5);
}
