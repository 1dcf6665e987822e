use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Limits applied at the transport edge and per session.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_connections_total: usize,
    pub max_connections_per_ip: usize,
    pub max_commands_per_second: u32,
    pub max_input_length: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_connections_total: 1000,
            max_connections_per_ip: 5,
            max_commands_per_second: 20,
            max_input_length: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitRejection {
    #[error("server at max connections")]
    TotalLimitReached,
    #[error("too many connections from this IP")]
    IpLimitReached,
}

/// Connection counts in total and per remote address.
#[derive(Debug)]
pub struct ConnectionLimiter {
    config: RateLimitConfig,
    total: usize,
    per_ip: BTreeMap<IpAddr, usize>,
}

impl ConnectionLimiter {
    pub fn new(config: RateLimitConfig) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self {
            config,
            total: 0,
            per_ip: BTreeMap::new(),
        }))
    }

    pub fn try_admit(&mut self, ip: IpAddr) -> Result<(), RateLimitRejection> {
        if self.total >= self.config.max_connections_total {
            return Err(RateLimitRejection::TotalLimitReached);
        }
        let count = self.per_ip.entry(ip).or_insert(0);
        if *count >= self.config.max_connections_per_ip {
            return Err(RateLimitRejection::IpLimitReached);
        }
        *count += 1;
        self.total += 1;
        Ok(())
    }

    pub fn release(&mut self, ip: IpAddr) {
        if let Some(count) = self.per_ip.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.per_ip.remove(&ip);
            }
        }
        self.total = self.total.saturating_sub(1);
    }

    pub fn total_connections(&self) -> usize {
        self.total
    }
}

/// Token bucket guarding one session's command rate.
#[derive(Debug)]
pub struct CommandThrottle {
    capacity: u32,
    tokens: u32,
    last_refill: Instant,
}

impl CommandThrottle {
    pub fn new(max_per_second: u32) -> Self {
        Self::new_at(max_per_second, Instant::now())
    }

    /// Full bucket whose refill clock starts at `now`.
    pub fn new_at(max_per_second: u32, now: Instant) -> Self {
        Self {
            capacity: max_per_second,
            tokens: max_per_second,
            last_refill: now,
        }
    }

    /// Take one token if available at `now`.
    pub fn try_consume_at(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let earned = (elapsed.as_secs_f64() * self.capacity as f64) as u32;
        if earned > 0 {
            self.tokens = self.tokens.saturating_add(earned).min(self.capacity);
            self.last_refill = now;
        }
        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        true
    }

    pub fn try_consume(&mut self) -> bool {
        self.try_consume_at(Instant::now())
    }

    /// Time until at least one token is back.
    pub fn retry_after(&self) -> Duration {
        if self.tokens > 0 || self.capacity == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(1.0 / self.capacity as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn limiter_counts_per_ip_and_total() {
        let limiter = ConnectionLimiter::new(RateLimitConfig {
            max_connections_total: 3,
            max_connections_per_ip: 2,
            ..Default::default()
        });
        let a = IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1));
        let b = IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2));
        let c = IpAddr::V4(Ipv4Addr::new(3, 3, 3, 3));
        let mut l = limiter.lock().unwrap();
        assert!(l.try_admit(a).is_ok());
        assert!(l.try_admit(a).is_ok());
        assert_eq!(l.try_admit(a), Err(RateLimitRejection::IpLimitReached));
        assert!(l.try_admit(b).is_ok());
        assert_eq!(l.try_admit(c), Err(RateLimitRejection::TotalLimitReached));
        assert_eq!(l.total_connections(), 3);
    }

    #[test]
    fn limiter_release_frees_slot() {
        let limiter = ConnectionLimiter::new(RateLimitConfig {
            max_connections_per_ip: 1,
            ..Default::default()
        });
        let ip = IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9));
        let mut l = limiter.lock().unwrap();
        assert!(l.try_admit(ip).is_ok());
        assert!(l.try_admit(ip).is_err());
        l.release(ip);
        assert!(l.try_admit(ip).is_ok());
        // Releasing more than admitted never underflows.
        l.release(ip);
        l.release(ip);
        assert_eq!(l.total_connections(), 0);
    }

    #[test]
    fn throttle_burst_then_refill() {
        let start = Instant::now();
        let mut throttle = CommandThrottle::new_at(4, start);
        for _ in 0..4 {
            assert!(throttle.try_consume_at(start));
        }
        assert!(!throttle.try_consume_at(start));
        assert!(throttle.retry_after() > Duration::ZERO);

        let later = start + Duration::from_millis(500);
        assert!(throttle.try_consume_at(later));
        assert!(throttle.try_consume_at(later));
        assert!(!throttle.try_consume_at(later));
    }

    #[test]
    fn throttle_refill_is_measured_from_construction() {
        let start = Instant::now();
        let mut throttle = CommandThrottle::new_at(2, start);
        assert!(throttle.try_consume_at(start));
        assert!(throttle.try_consume_at(start));
        // Just short of one token's worth of time.
        assert!(!throttle.try_consume_at(start + Duration::from_millis(499)));
        assert!(throttle.try_consume_at(start + Duration::from_millis(500)));
    }

    #[test]
    fn rejection_messages() {
        assert_eq!(
            RateLimitRejection::IpLimitReached.to_string(),
            "too many connections from this IP"
        );
        assert_eq!(
            RateLimitRejection::TotalLimitReached.to_string(),
            "server at max connections"
        );
    }
}
