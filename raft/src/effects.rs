use rand::Rng;
use std::ops::Range;
use std::time::{Duration, Instant};

/// Draws the next election deadline uniformly from `now + [min, max)`, so
/// that identically configured peers do not time out in lockstep.
pub(crate) fn election_deadline(now: Instant, timeout: &Range<Duration>) -> Instant {
    now + random_timeout(timeout)
}

pub(crate) fn random_timeout(timeout: &Range<Duration>) -> Duration {
    if timeout.is_empty() {
        return timeout.start;
    }
    let secs = rand::thread_rng().gen_range(timeout.start.as_secs_f64()..timeout.end.as_secs_f64());
    let drawn = Duration::from_secs_f64(secs);
    if timeout.contains(&drawn) {
        drawn
    } else {
        timeout.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn timeouts_stay_in_range_and_vary() {
        let range = Duration::from_secs(4)..Duration::from_secs(10);
        let samples: Vec<Duration> = (0..500).map(|_| random_timeout(&range)).collect();

        assert!(samples.iter().all(|t| range.contains(t)), "{samples:?}");
        let distinct: HashSet<_> = samples.iter().collect();
        assert!(distinct.len() > 450);
    }

    #[test]
    fn deadline_is_offset_from_now() {
        let now = Instant::now();
        let range = Duration::from_millis(150)..Duration::from_millis(300);
        let deadline = election_deadline(now, &range);
        assert!(deadline >= now + range.start);
        assert!(deadline < now + range.end);
    }
}
