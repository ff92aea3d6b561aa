mod callable;
mod class;
mod function;
mod instance;
mod native;

pub use callable::Callable;
pub use class::Class;
pub use function::Function;
pub use instance::Instance;
pub use native::Native;
