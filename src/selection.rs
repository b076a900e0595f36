//! Named object selections and the marker-pick workflow.
//!
//! A selection is a named, colored set of segmentation object ids curated
//! by the user and consumed as tool input (e.g. training classes). The
//! handler owns all selections of one viewer, keyed by object type, and
//! enforces that at most one selection is active across the whole handler.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::color::Color;
use crate::constants::SELECTION_PALETTE;
use crate::events::{EventBus, ViewerEvent};
use crate::model::ObjectId;

/// A named, colored, user-curated set of object ids.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Identifier, unique per object type.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Marker color, auto-chosen from the palette on creation.
    pub color: Color,
    /// Whether this selection is the handler's active one.
    pub active: bool,
    member_ids: HashSet<ObjectId>,
}

impl Selection {
    fn new(id: u32, name: String, color: Color) -> Self {
        Self {
            id,
            name,
            color,
            active: false,
            member_ids: HashSet::new(),
        }
    }

    /// Member object ids. Insertion order is not meaningful.
    pub fn member_ids(&self) -> &HashSet<ObjectId> {
        &self.member_ids
    }

    /// Whether the given object is a member.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.member_ids.contains(&id)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.member_ids.len()
    }

    /// Whether the selection has no members.
    pub fn is_empty(&self) -> bool {
        self.member_ids.is_empty()
    }
}

/// Owner of all selections of one viewer, with activation and marker-pick
/// rules.
pub struct MapObjectSelectionHandler {
    events: Rc<EventBus>,
    active_object_type: String,
    selections_by_type: HashMap<String, Vec<Selection>>,
    /// (object type, selection id) of the single active selection.
    active: Option<(String, u32)>,
    marker_mode: bool,
    next_id: HashMap<String, u32>,
    palette_cursor: HashMap<String, usize>,
}

impl MapObjectSelectionHandler {
    /// Create a handler with the given initially active object type.
    pub fn new(events: Rc<EventBus>, active_object_type: impl Into<String>) -> Self {
        Self {
            events,
            active_object_type: active_object_type.into(),
            selections_by_type: HashMap::new(),
            active: None,
            marker_mode: false,
            next_id: HashMap::new(),
            palette_cursor: HashMap::new(),
        }
    }

    /// Object type picks and new selections currently apply to.
    pub fn active_object_type(&self) -> &str {
        &self.active_object_type
    }

    /// Switch the active object type.
    pub fn set_active_object_type(&mut self, object_type: impl Into<String>) {
        self.active_object_type = object_type.into();
    }

    /// Create a new empty selection for an object type, colored by simple
    /// round-robin over the fixed palette so sibling selections stay
    /// visually distinct. Returns its id.
    pub fn add_new_selection(&mut self, object_type: &str) -> u32 {
        let id = {
            let next = self.next_id.entry(object_type.to_string()).or_insert(1);
            let id = *next;
            *next += 1;
            id
        };
        let color = {
            let cursor = self
                .palette_cursor
                .entry(object_type.to_string())
                .or_insert(0);
            let color = SELECTION_PALETTE[*cursor % SELECTION_PALETTE.len()];
            *cursor += 1;
            color
        };

        let selection = Selection::new(id, format!("selection-{id}"), color);
        self.selections_by_type
            .entry(object_type.to_string())
            .or_default()
            .push(selection);

        log::debug!("Created selection {id} for object type '{object_type}'");
        self.events.publish(&ViewerEvent::SelectionChanged {
            object_type: object_type.to_string(),
            selection_id: id,
        });
        id
    }

    /// Destroy a selection. Clears the active pointer first when the
    /// selection is the active one, so no dangling pointer survives.
    /// Returns whether a selection was removed.
    pub fn remove_selection(&mut self, object_type: &str, id: u32) -> bool {
        if self
            .active
            .as_ref()
            .is_some_and(|(t, i)| t == object_type && *i == id)
        {
            self.active = None;
            self.events.publish(&ViewerEvent::ActiveSelectionChanged {
                object_type: None,
                selection_id: None,
            });
        }

        let Some(bucket) = self.selections_by_type.get_mut(object_type) else {
            log::warn!("remove_selection: no selections for object type '{object_type}'");
            return false;
        };
        let before = bucket.len();
        bucket.retain(|s| s.id != id);
        let removed = bucket.len() < before;
        if removed {
            log::debug!("Removed selection {id} for object type '{object_type}'");
            self.events.publish(&ViewerEvent::SelectionChanged {
                object_type: object_type.to_string(),
                selection_id: id,
            });
        } else {
            log::warn!("remove_selection: selection {id} not found for '{object_type}'");
        }
        removed
    }

    /// Toggle activation. Activating a selection implicitly deactivates
    /// whichever one was active before; exclusivity holds by construction.
    pub fn toggle_active_selection(&mut self, object_type: &str, id: u32) {
        let was_active = self
            .active
            .as_ref()
            .is_some_and(|(t, i)| t == object_type && *i == id);

        // Drop the previous active flag wherever it lives.
        if let Some((prev_type, prev_id)) = self.active.take() {
            if let Some(prev) = self.selection_mut_in(&prev_type, prev_id) {
                prev.active = false;
            }
        }

        if was_active {
            self.events.publish(&ViewerEvent::ActiveSelectionChanged {
                object_type: None,
                selection_id: None,
            });
            return;
        }

        match self.selection_mut_in(object_type, id) {
            Some(selection) => {
                selection.active = true;
                self.active = Some((object_type.to_string(), id));
                self.events.publish(&ViewerEvent::ActiveSelectionChanged {
                    object_type: Some(object_type.to_string()),
                    selection_id: Some(id),
                });
            }
            None => {
                log::warn!(
                    "toggle_active_selection: selection {id} not found for '{object_type}'"
                );
            }
        }
    }

    /// The single active selection, if any.
    pub fn active_selection(&self) -> Option<&Selection> {
        let (object_type, id) = self.active.as_ref()?;
        self.selections_by_type
            .get(object_type)?
            .iter()
            .find(|s| s.id == *id)
    }

    /// Enter marker-pick mode.
    pub fn activate_marker_selection_mode(&mut self) {
        if !self.marker_mode {
            self.marker_mode = true;
            self.events
                .publish(&ViewerEvent::MarkerModeChanged { active: true });
        }
    }

    /// Leave marker-pick mode.
    pub fn deactivate_marker_selection_mode(&mut self) {
        if self.marker_mode {
            self.marker_mode = false;
            self.events
                .publish(&ViewerEvent::MarkerModeChanged { active: false });
        }
    }

    /// Whether marker-pick mode is on.
    pub fn marker_mode_active(&self) -> bool {
        self.marker_mode
    }

    /// Handle a pick event delivered by the renderer.
    ///
    /// Toggle-on-click: a picked id joins the active selection if absent
    /// and leaves it if present. Picks with no active selection, or
    /// outside marker mode, are logged no-ops.
    pub fn on_pick(&mut self, object_id: ObjectId) {
        if !self.marker_mode {
            log::debug!("Ignoring pick of object {object_id}: marker mode inactive");
            return;
        }
        let Some((object_type, id)) = self.active.clone() else {
            log::warn!("Ignoring pick of object {object_id}: no active selection");
            return;
        };

        let Some(selection) = self.selection_mut_in(&object_type, id) else {
            return;
        };
        if !selection.member_ids.remove(&object_id) {
            selection.member_ids.insert(object_id);
        }
        self.events.publish(&ViewerEvent::SelectionChanged {
            object_type,
            selection_id: id,
        });
    }

    /// Bulk-register objects into the active selection (e.g. from a
    /// tool-config widget). A no-op without an active selection.
    pub fn extend_active_selection(&mut self, object_ids: &[ObjectId]) {
        let Some((object_type, id)) = self.active.clone() else {
            log::warn!("extend_active_selection: no active selection");
            return;
        };
        let Some(selection) = self.selection_mut_in(&object_type, id) else {
            return;
        };
        selection.member_ids.extend(object_ids.iter().copied());
        self.events.publish(&ViewerEvent::SelectionChanged {
            object_type,
            selection_id: id,
        });
    }

    /// Empty a selection's membership without destroying it.
    pub fn clear(&mut self, object_type: &str, id: u32) {
        if let Some(selection) = self.selection_mut_in(object_type, id) {
            selection.member_ids.clear();
            self.events.publish(&ViewerEvent::SelectionChanged {
                object_type: object_type.to_string(),
                selection_id: id,
            });
        }
    }

    /// Current selections of one object type, in creation order.
    ///
    /// The returned slice reflects live handler state; mutation goes
    /// exclusively through the handler's own methods.
    pub fn selections_for_type(&self, object_type: &str) -> &[Selection] {
        self.selections_by_type
            .get(object_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// One selection by object type and id.
    pub fn selection(&self, object_type: &str, id: u32) -> Option<&Selection> {
        self.selections_by_type
            .get(object_type)?
            .iter()
            .find(|s| s.id == id)
    }

    fn selection_mut_in(&mut self, object_type: &str, id: u32) -> Option<&mut Selection> {
        self.selections_by_type
            .get_mut(object_type)?
            .iter_mut()
            .find(|s| s.id == id)
    }

    pub(crate) fn restore_selection(
        &mut self,
        object_type: &str,
        id: u32,
        name: String,
        color: Color,
        member_ids: impl IntoIterator<Item = ObjectId>,
    ) {
        let mut selection = Selection::new(id, name, color);
        selection.member_ids.extend(member_ids);
        self.selections_by_type
            .entry(object_type.to_string())
            .or_default()
            .push(selection);
        let next = self.next_id.entry(object_type.to_string()).or_insert(1);
        *next = (*next).max(id + 1);
    }

    pub(crate) fn clear_all(&mut self) {
        self.selections_by_type.clear();
        self.active = None;
        self.next_id.clear();
        self.palette_cursor.clear();
    }

    pub(crate) fn iter_all(&self) -> impl Iterator<Item = (&str, &Selection)> {
        self.selections_by_type
            .iter()
            .flat_map(|(object_type, bucket)| {
                bucket.iter().map(move |s| (object_type.as_str(), s))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_handler() -> MapObjectSelectionHandler {
        MapObjectSelectionHandler::new(Rc::new(EventBus::new()), "cells")
    }

    #[test]
    fn test_palette_round_robin_gives_distinct_colors() {
        let mut handler = test_handler();
        let a = handler.add_new_selection("cells");
        let b = handler.add_new_selection("cells");
        let c = handler.add_new_selection("cells");
        let colors: Vec<Color> = [a, b, c]
            .iter()
            .map(|id| handler.selection("cells", *id).unwrap().color)
            .collect();
        assert_ne!(colors[0], colors[1]);
        assert_ne!(colors[1], colors[2]);
        assert_ne!(colors[0], colors[2]);
    }

    #[test]
    fn test_activation_is_globally_exclusive() {
        let mut handler = test_handler();
        let a = handler.add_new_selection("cells");
        let b = handler.add_new_selection("nuclei");

        handler.toggle_active_selection("cells", a);
        assert!(handler.selection("cells", a).unwrap().active);

        // Activating B across object types deactivates A.
        handler.toggle_active_selection("nuclei", b);
        assert!(!handler.selection("cells", a).unwrap().active);
        assert!(handler.selection("nuclei", b).unwrap().active);
        assert_eq!(handler.active_selection().unwrap().id, b);
    }

    #[test]
    fn test_toggle_active_selection_deactivates_itself() {
        let mut handler = test_handler();
        let a = handler.add_new_selection("cells");
        handler.toggle_active_selection("cells", a);
        handler.toggle_active_selection("cells", a);
        assert!(handler.active_selection().is_none());
        assert!(!handler.selection("cells", a).unwrap().active);
    }

    #[test]
    fn test_marker_pick_toggles_membership() {
        let mut handler = test_handler();
        let a = handler.add_new_selection("cells");
        handler.toggle_active_selection("cells", a);
        handler.extend_active_selection(&[12, 47, 99]);
        handler.activate_marker_selection_mode();

        handler.on_pick(55);
        let members = handler.selection("cells", a).unwrap().member_ids();
        assert_eq!(members.len(), 4);
        assert!(members.contains(&55));

        handler.on_pick(55);
        let members = handler.selection("cells", a).unwrap().member_ids();
        assert_eq!(members.len(), 3);
        assert!(!members.contains(&55));
        assert!(members.contains(&12) && members.contains(&47) && members.contains(&99));
    }

    #[test]
    fn test_pick_without_active_selection_is_noop() {
        let mut handler = test_handler();
        let a = handler.add_new_selection("cells");
        handler.activate_marker_selection_mode();
        handler.on_pick(7);
        assert!(handler.selection("cells", a).unwrap().is_empty());
    }

    #[test]
    fn test_pick_outside_marker_mode_is_noop() {
        let mut handler = test_handler();
        let a = handler.add_new_selection("cells");
        handler.toggle_active_selection("cells", a);
        handler.on_pick(7);
        assert!(handler.selection("cells", a).unwrap().is_empty());
    }

    #[test]
    fn test_remove_active_selection_clears_pointer() {
        let mut handler = test_handler();
        let a = handler.add_new_selection("cells");
        handler.toggle_active_selection("cells", a);
        assert!(handler.remove_selection("cells", a));
        assert!(handler.active_selection().is_none());
        assert!(handler.selections_for_type("cells").is_empty());
    }

    #[test]
    fn test_clear_keeps_selection_alive() {
        let mut handler = test_handler();
        let a = handler.add_new_selection("cells");
        handler.toggle_active_selection("cells", a);
        handler.extend_active_selection(&[1, 2, 3]);
        handler.clear("cells", a);
        let selection = handler.selection("cells", a).unwrap();
        assert!(selection.is_empty());
        assert!(selection.active);
    }
}
