//! Captive-portal DNS responder.
//!
//! While the setup access point is up, every DNS query gets answered
//! with the device's own address, so a phone joining the AP is steered
//! to the control page. The packet logic is a pure function over the
//! query bytes; a small UDP thread feeds it. Torn down together with
//! the AP at the end of the linger period.

use core::net::Ipv4Addr;
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{info, warn};

pub const DNS_PORT: u16 = 53;
const HEADER_LEN: usize = 12;
const ANSWER_TTL_SECS: u32 = 60;

/// Build the wildcard answer for one DNS query packet.
///
/// Echoes the question and appends a single A record pointing at
/// `answer_ip`. Returns `None` for packets too short or with no
/// question to answer.
pub fn answer_query(query: &[u8], answer_ip: Ipv4Addr) -> Option<Vec<u8>> {
    if query.len() < HEADER_LEN {
        return None;
    }
    let qdcount = u16::from_be_bytes([query[4], query[5]]);
    if qdcount == 0 {
        return None;
    }

    // Walk the first question's labels to find its end.
    let mut pos = HEADER_LEN;
    loop {
        let len = *query.get(pos)? as usize;
        if len == 0 {
            pos += 1;
            break;
        }
        // Compressed names do not appear in questions.
        if len & 0xC0 != 0 {
            return None;
        }
        pos += 1 + len;
    }
    let question_end = pos + 4; // qtype + qclass
    if query.len() < question_end {
        return None;
    }

    let mut resp = Vec::with_capacity(question_end + 16);
    // ID copied; flags: response, recursion available, no error.
    resp.extend_from_slice(&query[0..2]);
    resp.extend_from_slice(&[0x81, 0x80]);
    resp.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    resp.extend_from_slice(&1u16.to_be_bytes()); // ANCOUNT
    resp.extend_from_slice(&0u16.to_be_bytes()); // NSCOUNT
    resp.extend_from_slice(&0u16.to_be_bytes()); // ARCOUNT
    resp.extend_from_slice(&query[HEADER_LEN..question_end]);

    // Answer: pointer to the question name, A/IN, short TTL, the IP.
    resp.extend_from_slice(&[0xC0, 0x0C]);
    resp.extend_from_slice(&1u16.to_be_bytes()); // TYPE A
    resp.extend_from_slice(&1u16.to_be_bytes()); // CLASS IN
    resp.extend_from_slice(&ANSWER_TTL_SECS.to_be_bytes());
    resp.extend_from_slice(&4u16.to_be_bytes()); // RDLENGTH
    resp.extend_from_slice(&answer_ip.octets());
    Some(resp)
}

/// Lifecycle wrapper around the responder thread.
pub struct CaptiveDns {
    answer_ip: Ipv4Addr,
    port: u16,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CaptiveDns {
    pub fn new(answer_ip: Ipv4Addr) -> Self {
        Self::with_port(answer_ip, DNS_PORT)
    }

    /// Non-standard port constructor, used by tests.
    pub fn with_port(answer_ip: Ipv4Addr, port: u16) -> Self {
        Self {
            answer_ip,
            port,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Bind the socket and start answering. Idempotent; a bind failure
    /// is logged and the responder stays down (the portal still works
    /// for clients that type the address directly).
    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }
        let socket = match UdpSocket::bind(("0.0.0.0", self.port)) {
            Ok(s) => s,
            Err(e) => {
                warn!("captive DNS bind failed: {e}");
                return;
            }
        };
        if let Err(e) = socket.set_read_timeout(Some(Duration::from_millis(250))) {
            warn!("captive DNS socket setup failed: {e}");
            return;
        }

        self.stop.store(false, Ordering::Relaxed);
        let stop = Arc::clone(&self.stop);
        let answer_ip = self.answer_ip;
        self.worker = Some(std::thread::spawn(move || {
            let mut buf = [0u8; 512];
            while !stop.load(Ordering::Relaxed) {
                match socket.recv_from(&mut buf) {
                    Ok((len, peer)) => {
                        if let Some(resp) = answer_query(&buf[..len], answer_ip) {
                            let _ = socket.send_to(&resp, peer);
                        }
                    }
                    Err(e)
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut => {}
                    Err(e) => {
                        warn!("captive DNS recv error: {e}");
                        break;
                    }
                }
            }
        }));
        info!("captive DNS answering * → {}", self.answer_ip);
    }

    /// Stop the responder and join the thread. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
            info!("captive DNS stopped");
        }
    }
}

impl Drop for CaptiveDns {
    fn drop(&mut self) {
        self.stop();
    }
}
