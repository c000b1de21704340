//! Simulated instrument for tests

use std::sync::Arc;

use bytes::Bytes;
use i1d3_core::codec::{self, BigEndian, LittleEndian};
use i1d3_core::constants::{status, CLOCK_HZ};
use i1d3_core::{UnlockKey, FRAME_SIZE};
use i1d3_transport::ScriptedTransport;
use parking_lot::Mutex;

pub(crate) const PRODUCT_NAME: &str = "i1Display3 ";

/// Key the simulated firmware accepts
pub(crate) const GOOD_KEY: UnlockKey = UnlockKey(0x1234_5678, 0x9ABC_DEF0);

pub(crate) const CHALLENGE: [u8; 4] = [0xC0, 0xFF, 0xEE, 0x42];

#[derive(Debug, Clone)]
pub(crate) struct FakeState {
    pub light_hz: [f64; 3],
    pub locked: bool,
    pub led_mode: Option<u8>,
    pub challenges: usize,
    /// Frequency measurements answered before the instrument goes silent
    pub frequency_budget: Option<usize>,
}

impl FakeState {
    pub(crate) fn new(light_hz: [f64; 3], locked: bool) -> Self {
        Self {
            light_hz,
            locked,
            led_mode: None,
            challenges: 0,
            frequency_budget: None,
        }
    }
}

/// Test responder: key words followed by the first challenge bytes
pub(crate) fn responder(challenge: &[u8], key: UnlockKey) -> Bytes {
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(&key.0.to_le_bytes());
    out.extend_from_slice(&key.1.to_le_bytes());
    out.extend_from_slice(&challenge[2..6]);
    Bytes::from(out)
}

/// Transport answering like an instrument looking at constant light
pub(crate) fn instrument(state: FakeState) -> (ScriptedTransport, Arc<Mutex<FakeState>>) {
    let state = Arc::new(Mutex::new(state));
    let shared = Arc::clone(&state);
    let transport = ScriptedTransport::new().with_responder(move |req| respond(&shared, req));
    (transport, state)
}

fn put_string(frame: &mut [u8], s: &str) {
    frame[2..2 + s.len()].copy_from_slice(s.as_bytes());
}

fn respond(state: &Mutex<FakeState>, req: &[u8]) -> Option<Vec<u8>> {
    let mut state = state.lock();
    let mut frame = vec![0u8; FRAME_SIZE];
    frame[1] = req[0];

    match (req[0], req[1]) {
        (0x00, 0x00) => put_string(&mut frame, "Simulated i1d3"),
        (0x00, 0x01) => frame[2..5].copy_from_slice(&[0x01, 0x02, 0x03]),
        (0x00, 0x10) => put_string(&mut frame, PRODUCT_NAME),
        (0x00, 0x11) => codec::write_u16::<LittleEndian>(&mut frame, 3, 0x0001).unwrap(),
        (0x00, 0x12) => put_string(&mut frame, "v2.28"),
        (0x00, 0x13) => put_string(&mut frame, "29Mar11"),
        (0x00, 0x20) => {
            frame[2] = u8::from(state.locked);
            frame[3] = 0x01;
        }
        (0x01, _) => {
            match state.frequency_budget.as_mut() {
                Some(0) => return None,
                Some(left) => *left -= 1,
                None => {}
            }
            let clocks = codec::read_u32::<LittleEndian>(req, 1).unwrap();
            let seconds = clocks as f64 / CLOCK_HZ;
            for (i, hz) in state.light_hz.iter().enumerate() {
                let count = (hz * seconds).floor() as u32;
                codec::write_u32::<LittleEndian>(&mut frame, 2 + 4 * i, count).unwrap();
            }
        }
        (0x02, _) => {
            let mask = req[7];
            let mut any = false;
            for (i, hz) in state.light_hz.iter().enumerate() {
                let edges = codec::read_u16::<LittleEndian>(req, 1 + 2 * i).unwrap();
                if mask & (1 << i) != 0 && *hz > 0.0 {
                    let ticks = (edges as f64 * CLOCK_HZ / hz).round() as u32;
                    codec::write_u32::<LittleEndian>(&mut frame, 2 + 4 * i, ticks).unwrap();
                    any = true;
                }
            }
            if !any {
                frame[0] = status::PERIOD_NO_EDGES;
            }
        }
        (0x08, _) => {
            let (address, len) = (req[1] as usize, req[2] as usize);
            for i in 0..len {
                frame[4 + i] = (address + i) as u8;
            }
        }
        (0x12, _) => {
            let address = codec::read_u16::<BigEndian>(req, 3).unwrap() as usize;
            let len = req[5] as usize;
            for i in 0..len {
                frame[5 + i] = ((address + i) as u8) ^ 0xA5;
            }
        }
        (0x21, _) => state.led_mode = Some(req[1]),
        (0x99, _) => {
            state.challenges += 1;
            frame[2..6].copy_from_slice(&CHALLENGE);
        }
        (0x9a, _) => {
            frame[1] = 0x00;
            let expected = responder(&frame_with_challenge(), GOOD_KEY);
            if req[1..1 + expected.len()] == expected[..] {
                state.locked = false;
                frame[2] = status::UNLOCK_ACCEPTED;
            }
        }
        _ => frame[0] = 0x01,
    }

    Some(frame)
}

fn frame_with_challenge() -> [u8; FRAME_SIZE] {
    let mut frame = [0u8; FRAME_SIZE];
    frame[1] = 0x99;
    frame[2..6].copy_from_slice(&CHALLENGE);
    frame
}
