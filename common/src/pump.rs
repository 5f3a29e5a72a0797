use crate::types::{Mode, ModeSet};

/// Modes the shared compressor line can serve right now.
///
/// Idle units do not constrain the line. Any active unit restricts the whole
/// pump to OFF plus its own mode. A unit whose mode has never been
/// acknowledged pins the pump to OFF: nothing autonomous starts until every
/// unit's actual state is known.
pub fn usable_modes<I>(unit_modes: I) -> ModeSet
where
    I: IntoIterator<Item = Option<Mode>>,
{
    let mut usable = ModeSet::ALL;
    let mut any_active = false;

    for mode in unit_modes {
        match mode {
            Some(Mode::Off) => {}
            Some(mode) => {
                any_active = true;
                usable = usable.intersect(ModeSet::only(Mode::Off).with(mode));
            }
            None => return ModeSet::only(Mode::Off),
        }
    }

    if any_active {
        usable
    } else {
        ModeSet::ALL
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn idle_pump_can_pick_any_mode() {
        let usable = usable_modes([Some(Mode::Off), Some(Mode::Off)]);
        assert_eq!(usable, ModeSet::ALL);
    }

    #[test]
    fn active_unit_restricts_the_line() {
        let usable = usable_modes([Some(Mode::Heat), Some(Mode::Off)]);
        assert!(usable.contains(Mode::Off));
        assert!(usable.contains(Mode::Heat));
        assert_eq!(usable.len(), 2);
    }

    #[test]
    fn unacknowledged_unit_pins_the_pump_off() {
        let usable = usable_modes([None, Some(Mode::Off)]);
        assert_eq!(usable, ModeSet::only(Mode::Off));
    }

    #[test]
    fn conflicting_units_leave_only_off() {
        let usable = usable_modes([Some(Mode::Heat), Some(Mode::Cool)]);
        assert_eq!(usable, ModeSet::only(Mode::Off));
    }
}
