//! Last-activity stamping for idle timeout.

use crate::session::SessionAccessor;

/// Records a request at `now` epoch seconds.
pub fn touch<S>(session: &mut S, now: i64)
where
    S: SessionAccessor + ?Sized,
{
    session.set_last_activity_at(now);
}
