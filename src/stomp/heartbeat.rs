use std::time::Duration;

/// Keep-alive periods agreed during the handshake. `None` means that
/// direction is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub send_every: Option<Duration>,
    pub expect_every: Option<Duration>,
}

impl Heartbeat {
    /// Silence longer than this on the inbound side counts as a drop.
    pub fn inbound_deadline(&self) -> Option<Duration> {
        self.expect_every.map(|d| d * 2)
    }
}

/// Header value offered in CONNECT: `<outgoing>,<incoming>` in millis.
pub fn offer(outgoing: Duration, incoming: Duration) -> String {
    format!("{},{}", outgoing.as_millis(), incoming.as_millis())
}

pub fn parse(value: &str) -> Option<(u64, u64)> {
    let (sx, sy) = value.split_once(',')?;
    Some((sx.trim().parse().ok()?, sy.trim().parse().ok()?))
}

/// Combine our offer with the server's `heart-beat` header. A missing or
/// malformed header disables keep-alives in both directions.
pub fn negotiate(outgoing: Duration, incoming: Duration, server: Option<&str>) -> Heartbeat {
    let (sx, sy) = server.and_then(parse).unwrap_or((0, 0));
    let cx = outgoing.as_millis() as u64;
    let cy = incoming.as_millis() as u64;

    let period = |ours: u64, theirs: u64| {
        if ours == 0 || theirs == 0 {
            None
        } else {
            Some(Duration::from_millis(ours.max(theirs)))
        }
    };

    Heartbeat {
        send_every: period(cx, sy),
        expect_every: period(cy, sx),
    }
}
