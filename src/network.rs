//! Online/offline tracking.
//!
//! `NetworkMonitor` holds the two-state connectivity status and timestamps the
//! most recent loss and recovery. Screens read it to choose between the error
//! screen and stale cached content; the data fetcher subscribes to it to
//! refetch as soon as the device comes back online.

use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, info, trace, warn};
use tokio::net::TcpStream;
use tokio::sync::watch;

#[derive(Clone, Debug, PartialEq)]
pub struct NetworkStatus {
    pub is_online: bool,
    /// When connectivity was last (re)established.
    pub last_connected: Option<DateTime<Local>>,
    /// When connectivity was lost; cleared on recovery.
    pub connection_lost_at: Option<DateTime<Local>>,
}

impl NetworkStatus {
    pub fn initial(is_online: bool, now: DateTime<Local>) -> Self {
        if is_online {
            Self { is_online, last_connected: Some(now), connection_lost_at: None }
        } else {
            Self { is_online, last_connected: None, connection_lost_at: Some(now) }
        }
    }
}

#[derive(Debug)]
pub struct NetworkMonitor {
    tx: watch::Sender<NetworkStatus>,
}

impl NetworkMonitor {
    pub fn new(is_online: bool, now: DateTime<Local>) -> (Self, watch::Receiver<NetworkStatus>) {
        info!("Network monitor starting {}.", if is_online { "online" } else { "offline" });
        let (tx, rx) = watch::channel(NetworkStatus::initial(is_online, now));
        (Self { tx }, rx)
    }

    /// Records a connectivity observation. Only a change of state is
    /// published; returns whether a transition happened.
    pub fn report(&mut self, is_online: bool, now: DateTime<Local>) -> bool {
        self.tx.send_if_modified(|status| {
            if status.is_online == is_online {
                return false;
            }
            status.is_online = is_online;
            if is_online {
                status.last_connected = Some(now);
                status.connection_lost_at = None;
                info!("Connection restored at {}.", now.format("%H:%M:%S"));
            } else {
                status.connection_lost_at = Some(now);
                warn!("Connection lost at {}.", now.format("%H:%M:%S"));
            }
            true
        })
    }
}

/// Attempts a TCP connection to `addr` (`host:port`) within `timeout`.
pub async fn probe_connectivity(addr: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => {
            trace!("Connectivity probe to {} succeeded.", addr);
            true
        }
        Ok(Err(e)) => {
            debug!("Connectivity probe to {} failed: {}", addr, e);
            false
        }
        Err(_) => {
            debug!("Connectivity probe to {} timed out after {:?}.", addr, timeout);
            false
        }
    }
}

/// Periodically probes `addr` and feeds the result into the monitor.
///
/// Runs until every receiver of the monitor's status has been dropped.
pub async fn watch_connectivity(mut monitor: NetworkMonitor, addr: String, interval: Duration, timeout: Duration) {
    info!("Starting connectivity probe against {} every {:?}.", addr, interval);
    loop {
        let online = probe_connectivity(&addr, timeout).await;
        monitor.report(online, Local::now());
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = monitor.tx.closed() => {
                debug!("No network status subscribers left; stopping connectivity probe.");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 17, h, m, 0).unwrap()
    }

    #[test]
    fn test_initial_status_timestamps() {
        let online = NetworkStatus::initial(true, at(8, 0));
        assert_eq!(online.last_connected, Some(at(8, 0)));
        assert!(online.connection_lost_at.is_none());

        let offline = NetworkStatus::initial(false, at(8, 0));
        assert!(offline.last_connected.is_none());
        assert_eq!(offline.connection_lost_at, Some(at(8, 0)));
    }

    #[test]
    fn test_loss_and_recovery_are_recorded() {
        let (mut monitor, rx) = NetworkMonitor::new(true, at(8, 0));

        assert!(monitor.report(false, at(9, 15)));
        let status = rx.borrow().clone();
        assert!(!status.is_online);
        assert_eq!(status.connection_lost_at, Some(at(9, 15)));
        assert_eq!(status.last_connected, Some(at(8, 0)));

        assert!(monitor.report(true, at(9, 40)));
        let status = rx.borrow().clone();
        assert!(status.is_online);
        assert!(status.connection_lost_at.is_none());
        assert_eq!(status.last_connected, Some(at(9, 40)));
    }

    #[test]
    fn test_repeated_reports_are_not_transitions() {
        let (mut monitor, mut rx) = NetworkMonitor::new(false, at(7, 0));
        rx.borrow_and_update();
        assert!(!monitor.report(false, at(7, 5)));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(rx.borrow().connection_lost_at, Some(at(7, 0)));

        assert!(monitor.report(true, at(7, 10)));
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_probe_reports_reachable_and_unreachable_hosts() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().to_string();
        assert!(probe_connectivity(&open, Duration::from_secs(1)).await);

        let closed = {
            let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().to_string()
        };
        assert!(!probe_connectivity(&closed, Duration::from_secs(1)).await);
    }
}
