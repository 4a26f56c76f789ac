//! Data shaping nodes: Lua script and JSONPath extract.

use crate::node::{outputs, EvalContext, Inputs, Node, RestoreContext, SocketValues};
use anyhow::Result;
use mlua::LuaSerdeExt;
use serde_json::{json, Value};

/// Lua instructions a single evaluation may execute
const INSTRUCTION_BUDGET: u32 = 1_000_000;

/// Evaluates a Lua chunk with the input sockets bound to the `inputs` table
///
/// ```lua
/// return inputs.temperature > 22 and "cool" or "idle"
/// ```
#[derive(Debug, Default)]
pub struct Script {
    script: String,
}

impl Node for Script {
    fn restore(&mut self, properties: &Value, ctx: &RestoreContext<'_>) -> Result<()> {
        self.script = properties
            .get("script")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("Node '{}' missing 'script' property", ctx.node_id))?
            .to_string();
        Ok(())
    }

    fn evaluate(&mut self, inputs: &Inputs, _ctx: &mut EvalContext<'_>) -> Result<SocketValues> {
        let args = Value::Object(inputs.as_map().clone().into_iter().collect());
        let result = run_lua(&self.script, &args)?;
        Ok(outputs([("out", result)]))
    }

    fn serialize(&self) -> Value {
        json!({ "script": self.script })
    }
}

/// Run `script` in a fresh sandboxed interpreter
///
/// Scripts that exceed [`INSTRUCTION_BUDGET`] are aborted with an error.
fn run_lua(script: &str, inputs: &Value) -> Result<Value> {
    // A fresh interpreter per evaluation keeps the node Send
    let lua = mlua::Lua::new();
    lua.set_hook(
        mlua::HookTriggers::new().every_nth_instruction(INSTRUCTION_BUDGET),
        |_lua, _debug| {
            Err(mlua::Error::runtime(format!(
                "instruction budget of {} exhausted",
                INSTRUCTION_BUDGET
            )))
        },
    )
    .map_err(|e| anyhow::anyhow!("Failed to install Lua instruction budget: {}", e))?;
    let globals = lua.globals();

    for name in ["os", "io", "debug", "package", "require", "dofile", "loadfile"] {
        globals
            .set(name, mlua::Nil)
            .map_err(|e| anyhow::anyhow!("Failed to sandbox Lua global '{}': {}", name, e))?;
    }

    let table = lua
        .to_value(inputs)
        .map_err(|e| anyhow::anyhow!("Failed to pass inputs to Lua: {}", e))?;
    globals
        .set("inputs", table)
        .map_err(|e| anyhow::anyhow!("Failed to set Lua inputs: {}", e))?;

    let result: mlua::Value = lua
        .load(script)
        .eval()
        .map_err(|e| anyhow::anyhow!("Lua script failed: {}", e))?;
    lua_to_json(result)
}

/// Lua value to JSON; sequence tables become arrays, other tables objects
fn lua_to_json(value: mlua::Value) -> Result<Value> {
    match value {
        mlua::Value::Nil => Ok(Value::Null),
        mlua::Value::Boolean(b) => Ok(Value::Bool(b)),
        mlua::Value::Integer(i) => Ok(json!(i)),
        mlua::Value::Number(f) => Ok(serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        mlua::Value::String(s) => Ok(Value::String(
            s.to_str()
                .map_err(|e| anyhow::anyhow!("Invalid UTF-8 in Lua string: {}", e))?
                .to_string(),
        )),
        mlua::Value::Table(table) => {
            let mut entries = Vec::new();
            for pair in table.pairs::<mlua::Value, mlua::Value>() {
                let pair = pair.map_err(|e| anyhow::anyhow!("Failed to iterate Lua table: {}", e))?;
                entries.push(pair);
            }

            let len = entries.len() as i64;
            let is_sequence = len > 0
                && entries
                    .iter()
                    .all(|(key, _)| matches!(key, mlua::Value::Integer(i) if *i >= 1 && *i <= len));
            if is_sequence {
                entries.sort_by_key(|(key, _)| key.as_integer().unwrap_or_default());
                let items = entries
                    .into_iter()
                    .map(|(_, value)| lua_to_json(value))
                    .collect::<Result<Vec<_>>>()?;
                return Ok(Value::Array(items));
            }

            let mut object = serde_json::Map::new();
            for (key, value) in entries {
                let key = match key {
                    mlua::Value::String(s) => s
                        .to_str()
                        .map_err(|e| anyhow::anyhow!("Invalid UTF-8 in Lua key: {}", e))?
                        .to_string(),
                    mlua::Value::Integer(i) => i.to_string(),
                    mlua::Value::Number(f) => f.to_string(),
                    _ => continue,
                };
                object.insert(key, lua_to_json(value)?);
            }
            Ok(Value::Object(object))
        }
        _ => Ok(Value::Null),
    }
}

/// First JSONPath match of `path` in input `in`, on `out`
#[derive(Debug, Default)]
pub struct Extract {
    path: String,
}

impl Node for Extract {
    fn restore(&mut self, properties: &Value, ctx: &RestoreContext<'_>) -> Result<()> {
        self.path = properties
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("Node '{}' missing 'path' property", ctx.node_id))?
            .to_string();
        Ok(())
    }

    fn evaluate(&mut self, inputs: &Inputs, _ctx: &mut EvalContext<'_>) -> Result<SocketValues> {
        let document = inputs.value("in");
        let matches = jsonpath_lib::select(&document, &self.path)
            .map_err(|e| anyhow::anyhow!("JSONPath '{}' failed: {:?}", self.path, e))?;
        let first = matches.first().map(|value| (*value).clone()).unwrap_or(Value::Null);
        Ok(outputs([("out", first)]))
    }

    fn serialize(&self) -> Value {
        json!({ "path": self.path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lua_sees_inputs_and_returns_json() {
        let result = run_lua(
            "return { level = inputs.temp > 22 and 'warm' or 'cold', list = { 1, 2 } }",
            &json!({ "temp": 23.5 }),
        )
        .unwrap();
        assert_eq!(result, json!({ "level": "warm", "list": [1, 2] }));
    }

    #[test]
    fn lua_sandbox_hides_os() {
        assert!(run_lua("return os.time()", &json!({})).is_err());
    }

    #[test]
    fn runaway_script_is_aborted() {
        let err = run_lua("while true do end", &json!({})).unwrap_err();
        assert!(err.to_string().contains("instruction budget"), "{err}");

        // Bounded work well under the budget still completes
        let bounded = "local s = 0 for i = 1, 10000 do s = s + i end return s";
        let sum = run_lua(bounded, &json!({})).unwrap();
        assert_eq!(sum, json!(50005000));
    }
}
