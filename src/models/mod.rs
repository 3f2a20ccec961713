pub mod cart;

pub use cart::{AddressInput, CartLineItem};
