//! 点分路径字段访问
//!
//! 路径段为对象键或数组下标，如 `presentedForm.0.data`。

use serde_json::Value;

/// 按路径读取字段，任一段不存在时返回 `None`
pub fn get_by_path<'a>(resource: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = resource;
    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match current {
        Value::Null => None,
        value => Some(value),
    }
}

/// 按路径读取字符串字段
pub fn get_str_by_path<'a>(resource: &'a Value, path: &str) -> Option<&'a str> {
    get_by_path(resource, path).and_then(Value::as_str)
}
