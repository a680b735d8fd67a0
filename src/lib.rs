// 所有模块声明为公共的，二进制文件、测试和基准测试都能访问它们
pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod interfaces;
pub mod shared;
