//! 存储 key 命名约定
//!
//! key 名称是与其他进程共享的协议的一部分，修改会导致新旧进程互不可见。

/// 锁资源 key 前缀
pub const RESOURCE_PREFIX: &str = "compile-";

/// 心跳 key 后缀
pub const HEARTBEAT_SUFFIX: &str = ":hb";

/// 一次编译任务对应的锁 key 与心跳 key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockKeys {
    resource: String,
    heartbeat: String,
}

impl LockKeys {
    /// 由任务名派生：`compile-<name>` 与 `compile-<name>:hb`
    pub fn for_name(name: &str) -> Self {
        let resource = format!("{}{}", RESOURCE_PREFIX, name);
        let heartbeat = format!("{}{}", resource, HEARTBEAT_SUFFIX);
        Self {
            resource,
            heartbeat,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn heartbeat(&self) -> &str {
        &self.heartbeat
    }
}

/// 构建完成标记 key：`<name><suffix>`
pub fn marker_key(name: &str, suffix: &str) -> String {
    format!("{}{}", name, suffix)
}
