use std::cell::RefCell;
use std::rc::Rc;

use rhai::{Engine, EvalAltResult, ImmutableString, INT};

use crate::map::LevelMap;

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// What a level script can see: the map it builds and the items the player
/// carries while it runs.
#[derive(Clone, Debug, Default)]
pub struct ScriptWorld {
    pub map: LevelMap,
    pub inventory: Vec<String>,
}

/// The `map` argument handed to level functions. Clones share one world.
#[derive(Clone)]
pub struct MapHandle(pub Rc<RefCell<ScriptWorld>>);

impl MapHandle {
    pub fn new(map: LevelMap, inventory: Vec<String>) -> Self {
        Self(Rc::new(RefCell::new(ScriptWorld { map, inventory })))
    }

    pub fn map(&self) -> LevelMap {
        self.0.borrow().map.clone()
    }
}

pub(super) fn register(engine: &mut Engine) {
    engine.register_type_with_name::<MapHandle>("Map");
    engine.register_fn("get_width", get_width);
    engine.register_fn("get_height", get_height);
    engine.register_fn("place_player", place_player);
    engine.register_fn("place_object", place_object);
    engine.register_fn("get_object_type_at", get_object_type_at);
    engine.register_fn("count_objects", count_objects);
    engine.register_fn("get_player_x", get_player_x);
    engine.register_fn("get_player_y", get_player_y);
    engine.register_fn("has_item", has_item);
    engine.register_fn("display_chapter", display_chapter);
    engine.register_fn("write_status", write_status);
    engine.register_fn("validate_at_most", validate_at_most);
    engine.register_fn("validate_at_least", validate_at_least);
    engine.register_fn("validate_exactly", validate_exactly);
}

fn coord(value: INT) -> ScriptResult<i32> {
    i32::try_from(value).map_err(|_| format!("coordinate {value} is out of range").into())
}

fn get_width(handle: &mut MapHandle) -> INT {
    handle.0.borrow().map.width() as INT
}

fn get_height(handle: &mut MapHandle) -> INT {
    handle.0.borrow().map.height() as INT
}

fn place_player(handle: &mut MapHandle, x: INT, y: INT) -> ScriptResult<()> {
    let (x, y) = (coord(x)?, coord(y)?);
    handle
        .0
        .borrow_mut()
        .map
        .place_player(x, y)
        .map_err(|e| e.to_string().into())
}

fn place_object(handle: &mut MapHandle, x: INT, y: INT, kind: ImmutableString) -> ScriptResult<()> {
    let (x, y) = (coord(x)?, coord(y)?);
    handle
        .0
        .borrow_mut()
        .map
        .place_object(x, y, kind.as_str())
        .map_err(|e| e.to_string().into())
}

fn get_object_type_at(handle: &mut MapHandle, x: INT, y: INT) -> ScriptResult<ImmutableString> {
    let (x, y) = (coord(x)?, coord(y)?);
    let world = handle.0.borrow();
    if !world.map.in_bounds(x, y) {
        return Err(format!("({x}, {y}) is outside the map").into());
    }
    Ok(world.map.object_at(x, y).unwrap_or("").into())
}

fn count_objects(handle: &mut MapHandle, kind: ImmutableString) -> INT {
    handle.0.borrow().map.count_objects(kind.as_str()) as INT
}

fn get_player_x(handle: &mut MapHandle) -> ScriptResult<INT> {
    let world = handle.0.borrow();
    if !world.map.player.placed {
        return Err("the player has not been placed".into());
    }
    Ok(world.map.player.x as INT)
}

fn get_player_y(handle: &mut MapHandle) -> ScriptResult<INT> {
    let world = handle.0.borrow();
    if !world.map.player.placed {
        return Err("the player has not been placed".into());
    }
    Ok(world.map.player.y as INT)
}

fn has_item(handle: &mut MapHandle, item: ImmutableString) -> bool {
    handle
        .0
        .borrow()
        .inventory
        .iter()
        .any(|i| i.as_str() == item.as_str())
}

fn display_chapter(handle: &mut MapHandle, title: ImmutableString) {
    handle.0.borrow_mut().map.chapter = Some(title.to_string());
}

fn write_status(handle: &mut MapHandle, text: ImmutableString) {
    handle.0.borrow_mut().map.status = Some(text.to_string());
}

fn validate_at_most(handle: &mut MapHandle, kind: ImmutableString, max: INT) -> ScriptResult<()> {
    let count = count_objects(handle, kind.clone());
    if count > max {
        return Err(format!("too many {kind} objects: {count} (at most {max})").into());
    }
    Ok(())
}

fn validate_at_least(handle: &mut MapHandle, kind: ImmutableString, min: INT) -> ScriptResult<()> {
    let count = count_objects(handle, kind.clone());
    if count < min {
        return Err(format!("not enough {kind} objects: {count} (at least {min})").into());
    }
    Ok(())
}

fn validate_exactly(handle: &mut MapHandle, kind: ImmutableString, n: INT) -> ScriptResult<()> {
    let count = count_objects(handle, kind.clone());
    if count != n {
        return Err(format!("expected exactly {n} {kind} objects, found {count}").into());
    }
    Ok(())
}
