use crate::models::Role;

/// Cancellations this far ahead refund the full amount (client-initiated).
pub const FULL_REFUND_NOTICE_MIN: i64 = 48 * 60;
/// Cancellations this far ahead refund half (client-initiated).
pub const HALF_REFUND_NOTICE_MIN: i64 = 24 * 60;
/// Fixed reschedule notice window, independent of actor.
pub const RESCHEDULE_NOTICE_MIN: i64 = 24 * 60;

#[derive(Debug, PartialEq)]
pub enum PolicyDenial {
    /// Inside the notice window; carries remaining hours for the caller.
    TooLate { hours_before: f64 },
    /// Booking has already been rescheduled the maximum number of times.
    RescheduleLimit { count: i64, max: i64 },
}

/// Refund for a cancellation, given minutes remaining until the session.
///
/// The tiers only apply to client-initiated cancellations; a trainer (or admin)
/// cancelling never penalizes the client, so the refund is always full.
/// Boundaries are inclusive on the lower tier: exactly 48h refunds 100%,
/// exactly 24h refunds 50%.
pub fn refund_amount(amount: i64, actor: Role, minutes_before: i64) -> i64 {
    match actor {
        Role::Client => {
            if minutes_before >= FULL_REFUND_NOTICE_MIN {
                amount
            } else if minutes_before >= HALF_REFUND_NOTICE_MIN {
                amount / 2
            } else {
                0
            }
        }
        Role::Trainer | Role::Admin => amount,
    }
}

/// Validate a reschedule request against the notice window and the cap.
pub fn check_reschedule(
    minutes_before: i64,
    reschedule_count: i64,
    max_reschedules: i64,
) -> Result<(), PolicyDenial> {
    if minutes_before < RESCHEDULE_NOTICE_MIN {
        return Err(PolicyDenial::TooLate {
            hours_before: hours(minutes_before),
        });
    }
    if reschedule_count >= max_reschedules {
        return Err(PolicyDenial::RescheduleLimit {
            count: reschedule_count,
            max: max_reschedules,
        });
    }
    Ok(())
}

/// Minutes → fractional hours, for error context.
pub fn hours(minutes_before: i64) -> f64 {
    minutes_before as f64 / 60.0
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const H: i64 = 60;

    #[test]
    fn test_client_refund_full_at_48h() {
        assert_eq!(refund_amount(1000, Role::Client, 48 * H), 1000);
    }

    #[test]
    fn test_client_refund_full_well_ahead() {
        assert_eq!(refund_amount(1000, Role::Client, 200 * H), 1000);
    }

    #[test]
    fn test_client_refund_half_at_47h59m() {
        assert_eq!(refund_amount(1000, Role::Client, 48 * H - 1), 500);
    }

    #[test]
    fn test_client_refund_half_at_24h() {
        assert_eq!(refund_amount(1000, Role::Client, 24 * H), 500);
    }

    #[test]
    fn test_client_refund_zero_at_23h59m() {
        assert_eq!(refund_amount(1000, Role::Client, 24 * H - 1), 0);
    }

    #[test]
    fn test_client_refund_zero_after_session_start() {
        assert_eq!(refund_amount(1000, Role::Client, -30), 0);
    }

    #[test]
    fn test_trainer_refund_always_full() {
        assert_eq!(refund_amount(1000, Role::Trainer, 48 * H), 1000);
        assert_eq!(refund_amount(1000, Role::Trainer, 2 * H), 1000);
        assert_eq!(refund_amount(1000, Role::Trainer, -30), 1000);
    }

    #[test]
    fn test_admin_refund_always_full() {
        assert_eq!(refund_amount(1000, Role::Admin, 1), 1000);
    }

    #[test]
    fn test_odd_amount_halves_down() {
        assert_eq!(refund_amount(999, Role::Client, 30 * H), 499);
    }

    #[test]
    fn test_reschedule_allowed_at_24h() {
        assert!(check_reschedule(24 * H, 0, 3).is_ok());
    }

    #[test]
    fn test_reschedule_denied_at_23h() {
        let denial = check_reschedule(23 * H, 0, 3).unwrap_err();
        assert_eq!(
            denial,
            PolicyDenial::TooLate {
                hours_before: 23.0
            }
        );
    }

    #[test]
    fn test_reschedule_denied_past_session() {
        let denial = check_reschedule(-90, 0, 3).unwrap_err();
        assert_eq!(
            denial,
            PolicyDenial::TooLate {
                hours_before: -1.5
            }
        );
    }

    #[test]
    fn test_reschedule_limit_enforced() {
        assert!(check_reschedule(48 * H, 2, 3).is_ok());
        let denial = check_reschedule(48 * H, 3, 3).unwrap_err();
        assert_eq!(denial, PolicyDenial::RescheduleLimit { count: 3, max: 3 });
    }

    #[test]
    fn test_window_checked_before_limit() {
        // Both violated: the window denial wins so the caller sees the right context
        let denial = check_reschedule(0, 5, 3).unwrap_err();
        assert!(matches!(denial, PolicyDenial::TooLate { .. }));
    }
}
