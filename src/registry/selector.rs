//! 服务名与 Secret 标签 / 注解之间的编码规则
//!
//! 这些常量是写入方与读取方之间的线上协议，必须逐字节一致，因此只能是
//! 编译期常量，不能做成配置项。

use crate::store::Selector;

/// 类型标签键
pub const LABEL_TYPE_KEY: &str = "micro.mu/type";
/// 类型标签值
pub const LABEL_TYPE_VALUE_SERVICE: &str = "service";
/// 按服务名选择的标签键前缀，例如 `micro.mu/selector-greeter`
pub const SVC_SELECTOR_PREFIX: &str = "micro.mu/selector-";
/// 按服务名选择的标签值
pub const SVC_SELECTOR_VALUE: &str = "service";
/// 保存序列化服务描述的注解 / 数据键前缀
pub const SERVICE_KEY_PREFIX: &str = "micro.mu/service-";

/// 生成可用作标签的服务名
///
/// 不属于 `[-A-Za-z0-9_.]` 的每个字节都替换为 `_`，输出字节长度与输入一致。
pub fn sanitize_name(name: &str) -> String {
    name.bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.') {
                b as char
            } else {
                '_'
            }
        })
        .collect()
}

/// 全部服务的选择器：`micro.mu/type=service`
pub fn type_selector() -> Selector {
    Selector::from([(
        LABEL_TYPE_KEY.to_string(),
        LABEL_TYPE_VALUE_SERVICE.to_string(),
    )])
}

/// 单个服务的选择器：`micro.mu/selector-<name>=service`
pub fn service_selector(name: &str) -> Selector {
    Selector::from([(selector_key(name), SVC_SELECTOR_VALUE.to_string())])
}

/// 单个服务的选择器标签键
pub fn selector_key(name: &str) -> String {
    format!("{}{}", SVC_SELECTOR_PREFIX, sanitize_name(name))
}

/// 保存服务描述的注解 / 数据键
pub fn annotation_key(name: &str) -> String {
    format!("{}{}", SERVICE_KEY_PREFIX, sanitize_name(name))
}

/// 判断一个注解 / 数据键是否保存服务描述
pub fn is_service_key(key: &str) -> bool {
    key.starts_with(SERVICE_KEY_PREFIX)
}

/// 选择器的查询串形式（`k1=v1,k2=v2`），用于日志和 REST 查询参数
pub fn format_selector(selector: &Selector) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
