/// `sandbox.rs` - restricted execution surface for formula callables
///
/// Formula VMs are created with a restricted set of standard libraries;
/// dangerous ones (os, io, debug, package, require) are never loaded.
/// On top of that, each compiled `process` function gets an exclusive
/// environment exposing a shallow copy of the math library and nothing
/// else, so from inside the callable even `string` is out of reach.

use mlua::{Function, Lua, LuaOptions, Result as LuaResult, StdLib, Table, Value};

/// Creates a new Lua VM with sandbox restrictions applied.
pub fn create_restricted_vm() -> LuaResult<Lua> {
    Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE,
        LuaOptions::default(),
    )
}

/// Builds a math-only environment and installs it as `func`'s `_ENV`.
/// Installed once per compiled callable, never per call.
pub fn install_math_env(lua: &Lua, func: &Function) -> LuaResult<()> {
    let env = math_only_env(lua)?;
    func.set_environment(env)?;
    Ok(())
}

/// Fresh environment table carrying a shallow copy of `math`, both flat
/// (`sin`, `floor`) and under the `math` key (`math.sin`). The copies are
/// private: a script mutating its own `math` cannot reach the VM's math
/// table or any other callable's copy.
pub fn math_only_env(lua: &Lua) -> LuaResult<Table> {
    let env = lua.create_table()?;
    let math_copy = lua.create_table()?;
    let math: Table = lua.globals().get("math")?;
    for pair in math.pairs::<Value, Value>() {
        let (key, value) = pair?;
        env.set(key.clone(), value.clone())?;
        math_copy.set(key, value)?;
    }
    env.set("math", math_copy)?;
    Ok(env)
}
