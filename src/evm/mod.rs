pub mod abi;
pub mod constants;
pub mod venue_a;
pub mod venue_b;

pub use venue_a::VenueA;
pub use venue_b::VenueB;
