/*!
Change notifications.

Whoever changes a record publishes a `Change`; anybody interested
subscribes and gets every `Change` published after that point. Publishing
never blocks, and it is not an error for nobody to be listening.
*/
use serde::Serialize;
use tokio::sync::broadcast;

const CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Change {
    Grades { section_id: i64, subject_id: i64 },
    Profile { email: String },
    Password { email: String },
}

#[derive(Clone)]
pub struct Feed {
    tx: broadcast::Sender<Change>,
}

impl Default for Feed {
    fn default() -> Self { Feed::new() }
}

impl Feed {
    pub fn new() -> Feed {
        let (tx, _) = broadcast::channel(CAPACITY);
        Feed { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.tx.subscribe()
    }

    /// Returns the number of subscribers who will see `change`.
    pub fn publish(&self, change: Change) -> usize {
        log::trace!("Feed::publish( {:?} ) called.", &change);
        self.tx.send(change).unwrap_or(0)
    }
}

/// Log every change at debug level until the feed closes.
pub async fn log_changes(mut rx: broadcast::Receiver<Change>) {
    loop {
        match rx.recv().await {
            Ok(change) => { log::debug!("Change: {:?}", &change); },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                log::warn!("Change logger fell behind; {} changes skipped.", n);
            },
            Err(broadcast::error::RecvError::Closed) => { return; },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nobody_listening() {
        let feed = Feed::new();
        assert_eq!(feed.publish(Change::Profile { email: "a@b.c".to_owned() }), 0);
    }

    #[tokio::test]
    async fn subscribers_see_later_changes() {
        let feed = Feed::new();
        feed.publish(Change::Profile { email: "early@b.c".to_owned() });

        let mut a = feed.subscribe();
        let mut b = feed.clone().subscribe();
        let c = Change::Grades { section_id: 3, subject_id: 7 };
        assert_eq!(feed.publish(c.clone()), 2);

        assert_eq!(a.recv().await.unwrap(), c);
        assert_eq!(b.recv().await.unwrap(), c);
        assert!(a.try_recv().is_err());
    }

    #[test]
    fn serialized_form() {
        let v = serde_json::to_value(
            Change::Grades { section_id: 3, subject_id: 7 }
        ).unwrap();
        assert_eq!(v["kind"], "grades");
        assert_eq!(v["section_id"], 3);
    }

    #[tokio::test]
    async fn logger_stops_when_feed_drops() {
        let feed = Feed::new();
        let handle = tokio::spawn(log_changes(feed.subscribe()));
        feed.publish(Change::Password { email: "a@b.c".to_owned() });
        drop(feed);
        handle.await.unwrap();
    }
}
