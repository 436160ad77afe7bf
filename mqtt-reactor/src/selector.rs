/// Identifies a transport handle to the host's I/O selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub usize);

/// Host-side readiness sink.
///
/// The reactor never blocks on I/O itself; it publishes its interest in
/// read/write readiness through this trait and the host wakes it with
/// `Reactor::read`/`Reactor::write` when the selector reports the transport
/// ready.
pub trait Selector {
    fn add_read(&mut self, token: Token);
    fn del_read(&mut self, token: Token);
    fn add_write(&mut self, token: Token);
    fn del_write(&mut self, token: Token);
}

/// Mirrors the reactor's `want_read`/`want_write` into a [`Selector`],
/// emitting only deltas.
#[derive(Debug, Default)]
pub struct ReadinessAdapter {
    token: Option<Token>,
    want_read: bool,
    want_write: bool,
}

impl ReadinessAdapter {
    pub fn new() -> Self {
        ReadinessAdapter::default()
    }

    pub fn update<S: Selector + ?Sized>(
        &mut self,
        selector: &mut S,
        want_read: bool,
        want_write: bool,
        token: Token,
    ) {
        if self.token != Some(token) {
            // Not permitted to switch to another transport while signed up
            // for notifications on an existing one.
            self.assert_closed();
            self.token = Some(token);
        }

        if self.want_write != want_write {
            self.want_write = want_write;

            if want_write {
                selector.add_write(token);
            } else {
                selector.del_write(token);
            }
        }

        if self.want_read != want_read {
            self.want_read = want_read;

            if want_read {
                selector.add_read(token);
            } else {
                selector.del_read(token);
            }
        }
    }

    pub fn assert_closed(&self) {
        assert!(!self.want_read);
        assert!(!self.want_write);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSelector {
        calls: Vec<(&'static str, Token)>,
    }

    impl Selector for RecordingSelector {
        fn add_read(&mut self, token: Token) {
            self.calls.push(("add_read", token));
        }

        fn del_read(&mut self, token: Token) {
            self.calls.push(("del_read", token));
        }

        fn add_write(&mut self, token: Token) {
            self.calls.push(("add_write", token));
        }

        fn del_write(&mut self, token: Token) {
            self.calls.push(("del_write", token));
        }
    }

    #[test]
    fn publishes_deltas_only() {
        let mut selector = RecordingSelector::default();
        let mut adapter = ReadinessAdapter::new();
        let token = Token(3);

        adapter.update(&mut selector, true, true, token);
        adapter.update(&mut selector, true, true, token);
        adapter.update(&mut selector, true, false, token);

        assert_eq!(
            selector.calls,
            vec![
                ("add_write", token),
                ("add_read", token),
                ("del_write", token),
            ]
        );
    }

    #[test]
    fn transport_switch_after_close() {
        let mut selector = RecordingSelector::default();
        let mut adapter = ReadinessAdapter::new();

        adapter.update(&mut selector, true, false, Token(0));
        adapter.update(&mut selector, false, false, Token(0));
        adapter.assert_closed();
        adapter.update(&mut selector, false, true, Token(1));

        assert_eq!(
            selector.calls,
            vec![
                ("add_read", Token(0)),
                ("del_read", Token(0)),
                ("add_write", Token(1)),
            ]
        );
    }

    #[test]
    #[should_panic]
    fn transport_switch_while_subscribed_asserts() {
        let mut selector = RecordingSelector::default();
        let mut adapter = ReadinessAdapter::new();

        adapter.update(&mut selector, true, false, Token(0));
        adapter.update(&mut selector, true, false, Token(1));
    }
}
