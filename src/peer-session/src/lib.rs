pub mod config;
pub mod entrypoint;
pub mod error;

pub mod model {
    pub mod external;
    pub mod internal;
}

pub mod service {
    pub mod lan;
    pub mod loopback;
    pub mod session;
    pub mod session_thread;
    pub mod transport;
}
