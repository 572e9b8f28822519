//! 工具参数 Schema：schemars 从参数结构体生成，jsonschema 在执行前校验模型给出的参数
//!
//! 生成的 schema 去掉 `$schema` / `title`，并强制 `additionalProperties: false`，
//! 与 function calling 的 parameters 字段格式一致。

use jsonschema::Validator;
use schemars::{schema_for, JsonSchema};
use serde_json::{json, Value};

/// 由参数类型生成 function calling 使用的 parameters schema
pub fn parameters_schema<T: JsonSchema>() -> Value {
    let root = schema_for!(T);
    let mut schema = serde_json::to_value(&root).unwrap_or_else(|_| json!({ "type": "object" }));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        if obj
            .get("definitions")
            .and_then(Value::as_object)
            .is_some_and(|d| d.is_empty())
        {
            obj.remove("definitions");
        }
        obj.entry("properties").or_insert_with(|| json!({}));
        obj.insert("additionalProperties".to_string(), Value::Bool(false));
    }
    schema
}

/// 编译参数 schema（注册时调用一次；schema 本身非法属于启动期错误）
pub fn compile_schema(schema: &Value) -> Result<Validator, String> {
    jsonschema::validator_for(schema).map_err(|e| e.to_string())
}

/// 按编译好的 schema 校验参数；多个错误以 "; " 连接
pub fn validate_arguments(validator: &Validator, args: &Value) -> Result<(), String> {
    let errors: Vec<String> = validator.iter_errors(args).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
