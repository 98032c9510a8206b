use chrono::{DateTime, Duration, TimeZone, Utc};
use routemap_core::record::{Hop, HopHost, PathRecord};
use uuid::Uuid;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub fn responding_hop(ip: &str, latency_ms: f64, loss_pct: f64) -> Hop {
    Hop {
        hosts: vec![HopHost {
            ip: ip.to_string(),
            hostname: None,
        }],
        loss_pct,
        latency_ms: Some(latency_ms),
        jitter_ms: None,
    }
}

pub fn silent_hop() -> Hop {
    Hop {
        hosts: Vec::new(),
        loss_pct: 100.0,
        latency_ms: None,
        jitter_ms: None,
    }
}

pub fn record(
    id: &str,
    minute: i64,
    agent: &str,
    target: &str,
    hops: Vec<Hop>,
) -> PathRecord {
    PathRecord {
        id: Uuid::parse_str(id).expect("fixture uuid"),
        agent: agent.to_string(),
        target: target.to_string(),
        timestamp: base_time() + Duration::minutes(minute),
        flagged: false,
        hops,
    }
}

/// Three traces from one agent over a stable route.
pub fn steady_stream() -> Vec<PathRecord> {
    let hops = || {
        vec![
            responding_hop("10.0.0.1", 1.2, 0.0),
            responding_hop("192.168.1.1", 4.8, 0.0),
            responding_hop("8.8.8.8", 12.5, 0.0),
        ]
    };

    vec![
        record(
            "aaaaaaaa-aaaa-4aaa-aaaa-aaaaaaaaaaaa",
            0,
            "berlin",
            "8.8.8.8",
            hops(),
        ),
        record(
            "bbbbbbbb-bbbb-4bbb-bbbb-bbbbbbbbbbbb",
            5,
            "berlin",
            "8.8.8.8",
            hops(),
        ),
        record(
            "cccccccc-cccc-4ccc-cccc-cccccccccccc",
            10,
            "berlin",
            "8.8.8.8",
            hops(),
        ),
    ]
}

/// Two traces where the middle hop moves between them; the second trace is
/// a route change.
pub fn route_change_stream() -> Vec<PathRecord> {
    vec![
        record(
            "aaaaaaaa-aaaa-4aaa-aaaa-aaaaaaaaaaaa",
            0,
            "berlin",
            "8.8.8.8",
            vec![
                responding_hop("10.0.0.1", 1.2, 0.0),
                responding_hop("192.168.1.1", 4.8, 0.0),
                responding_hop("8.8.8.8", 12.5, 0.0),
            ],
        ),
        record(
            "bbbbbbbb-bbbb-4bbb-bbbb-bbbbbbbbbbbb",
            5,
            "berlin",
            "8.8.8.8",
            vec![
                responding_hop("10.0.0.1", 1.3, 0.0),
                responding_hop("192.168.1.2", 5.1, 0.0),
                responding_hop("8.8.8.8", 12.9, 0.0),
            ],
        ),
    ]
}

/// A trace whose middle hop drops most probes; the destination still
/// answers.
pub fn lossy_stream() -> Vec<PathRecord> {
    vec![record(
        "dddddddd-dddd-4ddd-dddd-dddddddddddd",
        0,
        "tokyo",
        "1.1.1.1",
        vec![
            responding_hop("172.16.0.1", 0.9, 0.0),
            responding_hop("172.16.0.2", 3.4, 60.0),
            responding_hop("1.1.1.1", 9.7, 0.0),
        ],
    )]
}

/// A trace that never reaches its target; the tail goes silent.
pub fn truncated_stream() -> Vec<PathRecord> {
    vec![record(
        "eeeeeeee-eeee-4eee-eeee-eeeeeeeeeeee",
        0,
        "oslo",
        "9.9.9.9",
        vec![
            responding_hop("10.1.0.1", 1.0, 0.0),
            silent_hop(),
            silent_hop(),
        ],
    )]
}
