//! Work queue consumption: broker seam, RabbitMQ session, connection
//! supervision, delivery handling and dead-lettering.
mod broker;
pub use broker::*;

mod amqp;
pub use amqp::*;

mod consumer;
pub use consumer::*;

mod delivery;
pub use delivery::*;

mod dead_letter;
pub use dead_letter::*;
