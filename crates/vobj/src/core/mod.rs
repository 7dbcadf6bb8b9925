pub mod component;
pub mod contentline;
pub mod value;

pub use component::{Component, Node};
pub use contentline::ContentLine;
pub use value::{DateTimeValue, Period, PeriodEnd, Value};
