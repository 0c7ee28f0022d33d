pub mod datatype;
pub mod field;
pub mod interval;
pub mod scalar;
