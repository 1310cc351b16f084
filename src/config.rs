//! Configuration of the query engine.
//!
//! This covers the knobs of the coordinator and the multiplexers only.
//! Everything concerning how queries travel over the network, such as
//! which servers to ask and how often to try, belongs to the transport.
//! For the bundled UDP transport this is [`ResolvConf`].
//!
//! [`ResolvConf`]: crate::conf::ResolvConf

use std::time::Duration;

//------------ Configuration Constants ---------------------------------------

/// Configuration limits for the reactor's periodic drive.
const REACTOR_TICK: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_secs(1),
    Duration::from_millis(10),
    Duration::from_secs(60),
);

/// Configuration limits for the coordinator-level query deadline.
///
/// There is no default: unless a deadline is set, queries stay pending for
/// as long as the transport keeps them.
const QUERY_DEADLINE: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_secs(30),
    Duration::from_millis(10),
    Duration::from_secs(3600),
);

//------------ Config --------------------------------------------------------

/// Configuration for a [`Resolver`] and the loops driving it.
///
/// [`Resolver`]: crate::resolver::Resolver
#[derive(Clone, Debug)]
pub struct Config {
    /// How often the reactor drives the transport without readiness.
    reactor_tick: Duration,

    /// How long a query may stay pending before it is failed.
    query_deadline: Option<Duration>,
}

impl Config {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the reactor tick.
    ///
    /// While at least one descriptor is watched, the reactor-integrated
    /// mode drives the transport at least this often even if none of
    /// its sockets become ready. This lets the transport's retry timers
    /// fire.
    pub fn reactor_tick(&self) -> Duration {
        self.reactor_tick
    }

    /// Sets the reactor tick.
    ///
    /// If this value is too small or too large, it will be caped.
    pub fn set_reactor_tick(&mut self, value: Duration) {
        self.reactor_tick = REACTOR_TICK.limit(value)
    }

    /// Returns the query deadline.
    ///
    /// If set, a query that has been pending for longer than this is
    /// failed with [`QueryError::TIMEOUT`] by the coordinator, no matter
    /// what the transport thinks.
    ///
    /// [`QueryError::TIMEOUT`]: crate::status::QueryError::TIMEOUT
    pub fn query_deadline(&self) -> Option<Duration> {
        self.query_deadline
    }

    /// Sets the query deadline.
    ///
    /// If this value is too small or too large, it will be caped.
    pub fn set_query_deadline(&mut self, value: Option<Duration>) {
        self.query_deadline = value.map(|value| QUERY_DEADLINE.limit(value))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reactor_tick: REACTOR_TICK.default(),
            query_deadline: None,
        }
    }
}

//------------ DefMinMax -----------------------------------------------------

/// The default, minimum, and maximum values for a config variable.
#[derive(Clone, Copy)]
struct DefMinMax<T> {
    /// The default value.
    def: T,

    /// The minimum value.
    min: T,

    /// The maximum value.
    max: T,
}

impl<T: Ord> DefMinMax<T> {
    /// Creates a new value.
    const fn new(def: T, min: T, max: T) -> Self {
        Self { def, min, max }
    }

    /// Returns the default value.
    fn default(self) -> T {
        self.def
    }

    /// Trims the given value to fit into the minimum/maximum range.
    fn limit(self, value: T) -> T {
        value.clamp(self.min, self.max)
    }
}

//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::new();
        assert_eq!(config.reactor_tick(), Duration::from_secs(1));
        assert_eq!(config.query_deadline(), None);
        assert_eq!(QUERY_DEADLINE.default(), Duration::from_secs(30));
    }

    #[test]
    fn setters_cap_values() {
        let mut config = Config::new();
        config.set_reactor_tick(Duration::ZERO);
        assert_eq!(config.reactor_tick(), Duration::from_millis(10));
        config.set_reactor_tick(Duration::from_secs(3600));
        assert_eq!(config.reactor_tick(), Duration::from_secs(60));
        config.set_query_deadline(Some(Duration::from_secs(2)));
        assert_eq!(config.query_deadline(), Some(Duration::from_secs(2)));
        config.set_query_deadline(Some(Duration::from_nanos(1)));
        assert_eq!(config.query_deadline(), Some(Duration::from_millis(10)));
        config.set_query_deadline(None);
        assert_eq!(config.query_deadline(), None);
    }
}
