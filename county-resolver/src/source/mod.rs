//! Sources de points (pull)
//!
//! Une source renvoie `Ok(None)` en fin de flux, puis continue de renvoyer
//! `Ok(None)` à chaque appel suivant.

pub mod csv;

use crate::error::PointSourceError;
use crate::types::Point;

pub use self::csv::{CoordinateOrder, CsvOptions, CsvPointSource};

/// Fournisseur de points tiré un par un
pub trait PointSource {
    /// Point suivant, `None` en fin de flux
    fn next_point(&mut self) -> Result<Option<Point>, PointSourceError>;
}

impl<S: PointSource + ?Sized> PointSource for &mut S {
    fn next_point(&mut self) -> Result<Option<Point>, PointSourceError> {
        (**self).next_point()
    }
}

impl<S: PointSource + ?Sized> PointSource for Box<S> {
    fn next_point(&mut self) -> Result<Option<Point>, PointSourceError> {
        (**self).next_point()
    }
}

/// Source adossée à un itérateur de points
#[derive(Debug, Clone)]
pub struct IterSource<I> {
    inner: std::iter::Fuse<I>,
}

impl<I: Iterator<Item = Point>> IterSource<I> {
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            inner: iter.into_iter().fuse(),
        }
    }
}

impl IterSource<std::vec::IntoIter<Point>> {
    pub fn from_points(points: Vec<Point>) -> Self {
        Self::new(points)
    }
}

impl<I: Iterator<Item = Point>> PointSource for IterSource<I> {
    fn next_point(&mut self) -> Result<Option<Point>, PointSourceError> {
        Ok(self.inner.next())
    }
}

/// Source adossée à une closure; la fin de flux est définitive
pub struct FnSource<F> {
    f: F,
    done: bool,
}

/// Construit une source depuis une closure (équivalent de `std::iter::from_fn`)
pub fn from_fn<F>(f: F) -> FnSource<F>
where
    F: FnMut() -> Result<Option<Point>, PointSourceError>,
{
    FnSource { f, done: false }
}

impl<F> PointSource for FnSource<F>
where
    F: FnMut() -> Result<Option<Point>, PointSourceError>,
{
    fn next_point(&mut self) -> Result<Option<Point>, PointSourceError> {
        if self.done {
            return Ok(None);
        }
        let next = (self.f)()?;
        if next.is_none() {
            self.done = true;
        }
        Ok(next)
    }
}

impl<F> std::fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSource").field("done", &self.done).finish()
    }
}
