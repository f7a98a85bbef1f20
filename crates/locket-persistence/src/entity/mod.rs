//! SeaORM entity definitions

pub mod locks;

pub mod prelude {
    pub use super::locks::Entity as Locks;
}
