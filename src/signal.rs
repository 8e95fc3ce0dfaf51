use std::cell::RefCell;
use std::fmt;
use std::fmt::Debug;
use std::rc::Rc;

/// Identifies a single listener connected to a [Signal]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ListenerId(u64);

type Listener<E> = Rc<dyn Fn(&E)>;

struct SignalInner<E> {
    head: u64,
    listeners: Vec<(ListenerId, Listener<E>)>,
}

/// [Signal]
///
/// An ordered, single-threaded observer list. Listeners fire in subscription
/// order, and later listeners observe any state the emitter settled before
/// emitting
///
/// `Signal` is a cheap-clone handle over shared state, so an emitter can hold
/// a clone while the subscriber side connects and disconnects freely. Emission
/// walks a snapshot of the listener list: listeners may connect or disconnect
/// (including themselves) mid-emit without corrupting the fan-out, and a
/// listener disconnected mid-emit is not invoked.
///
/// Emission is fully re-entrant. A listener may synchronously trigger another
/// emit of the same signal, including one that reaches the listener itself,
/// which is why listeners are shared-callable `Fn` closures; listener state
/// that needs mutation lives behind `Cell`/`RefCell` captures
pub struct Signal<E> {
    inner: Rc<RefCell<SignalInner<E>>>,
}

impl<E> Signal<E> {
    pub fn new() -> Self {
        Signal {
            inner: Rc::new(RefCell::new(SignalInner {
                head: 0,
                listeners: Vec::new(),
            })),
        }
    }

    pub fn connect(&self, listener: impl Fn(&E) + 'static) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = ListenerId(inner.head);
        inner.head += 1;
        inner.listeners.push((id, Rc::new(listener)));
        id
    }

    /// No-op if the listener was already disconnected
    pub fn disconnect(&self, id: ListenerId) {
        self.inner.borrow_mut().listeners.retain(|(lid, _)| *lid != id);
    }

    pub fn emit(&self, event: &E) {
        let snapshot: Vec<(ListenerId, Listener<E>)> =
            self.inner.borrow().listeners.to_vec();

        for (id, listener) in snapshot {
            let connected = self
                .inner
                .borrow()
                .listeners
                .iter()
                .any(|(lid, _)| *lid == id);

            if connected {
                listener(event);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }
}

impl<E> Clone for Signal<E> {
    fn clone(&self) -> Self {
        Signal {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E> Default for Signal<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Debug for Signal<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signal({} listeners)", self.listener_count())
    }
}
