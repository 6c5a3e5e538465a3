//! Access Core - 权限评估与通用持久化引擎
//!
//! # 架构概述
//!
//! - **角色** (`role`): 角色继承图与角色管理
//! - **权限** (`permission`): 权限持有者与权限检查
//! - **查询** (`query`): 查询语言解析与条件翻译
//! - **存储** (`store`): 通用实体存储，带重试的事务
//!
//! # 模块结构
//!
//! ```text
//! access-core/src/
//! ├── config.rs      # 环境变量配置
//! ├── error.rs       # 引擎错误
//! ├── logger.rs      # 日志初始化
//! ├── permission/    # 持有者、权限服务
//! ├── query/         # 解析器、翻译器、条件求值
//! ├── role/          # 角色图、角色服务
//! └── store/         # 存储后端、实体存储
//! ```

pub mod config;
pub mod error;
pub mod logger;
pub mod permission;
pub mod query;
pub mod role;
pub mod store;

// Re-export 公共类型
pub use config::{DEFAULT_TRANSACTION_RETRIES, StoreConfig, load_dotenv};
pub use error::{CoreError, CoreResult};
pub use permission::{Actor, PermissionHolder, PermissionService, system_superadmin};
pub use query::{Condition, ConditionSortLimit, QueryTranslator, Value};
pub use role::{RoleGraph, RoleService};
pub use store::{EntityPolicy, EntityStore, MemoryStorage, RedbStorage, Storage};

// Re-export logger functions
pub use logger::{init_logger, init_logger_from_config, init_logger_with_file};

// Re-export shared models
pub use shared::models::{Permission, Role, RoleVo};
