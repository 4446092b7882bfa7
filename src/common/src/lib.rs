pub mod error;
pub mod utility;

pub mod model {
    pub mod game;
    pub mod identity;
    pub mod messages;
}
