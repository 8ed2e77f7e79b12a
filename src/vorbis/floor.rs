use thiserror::Error;

use super::{
    MAX_FLOOR_CLASSES, MAX_FLOOR_PARTITIONS, MAX_FLOOR_VALUES,
    bits::{BitReadError, BitReader, ilog},
    codebook::{Codebook, CodebookError},
};

/// Amplitude of each integer floor value, from about -140 dB up to 0 dB.
#[allow(clippy::excessive_precision)]
#[rustfmt::skip]
pub const FLOOR1_INVERSE_DB_TABLE: [f32; 256] = [
    1.0649863e-07, 1.1341951e-07, 1.2079015e-07, 1.2863978e-07,
    1.3699951e-07, 1.4590251e-07, 1.5538408e-07, 1.6548181e-07,
    1.7623575e-07, 1.8768855e-07, 1.9988561e-07, 2.1287530e-07,
    2.2670913e-07, 2.4144197e-07, 2.5713223e-07, 2.7384213e-07,
    2.9163793e-07, 3.1059021e-07, 3.3077411e-07, 3.5226968e-07,
    3.7516214e-07, 3.9954229e-07, 4.2550680e-07, 4.5315863e-07,
    4.8260743e-07, 5.1396998e-07, 5.4737065e-07, 5.8294187e-07,
    6.2082472e-07, 6.6116941e-07, 7.0413592e-07, 7.4989464e-07,
    7.9862701e-07, 8.5052630e-07, 9.0579828e-07, 9.6466216e-07,
    1.0273513e-06, 1.0941144e-06, 1.1652161e-06, 1.2409384e-06,
    1.3215816e-06, 1.4074654e-06, 1.4989305e-06, 1.5963394e-06,
    1.7000785e-06, 1.8105592e-06, 1.9282195e-06, 2.0535261e-06,
    2.1869758e-06, 2.3290978e-06, 2.4804557e-06, 2.6416497e-06,
    2.8133190e-06, 2.9961443e-06, 3.1908506e-06, 3.3982101e-06,
    3.6190449e-06, 3.8542308e-06, 4.1047004e-06, 4.3714470e-06,
    4.6555282e-06, 4.9580707e-06, 5.2802740e-06, 5.6234160e-06,
    5.9888572e-06, 6.3780469e-06, 6.7925283e-06, 7.2339451e-06,
    7.7040476e-06, 8.2047000e-06, 8.7378876e-06, 9.3057248e-06,
    9.9104632e-06, 1.0554501e-05, 1.1240392e-05, 1.1970856e-05,
    1.2748789e-05, 1.3577278e-05, 1.4459606e-05, 1.5399272e-05,
    1.6400004e-05, 1.7465768e-05, 1.8600792e-05, 1.9809576e-05,
    2.1096914e-05, 2.2467911e-05, 2.3928002e-05, 2.5482978e-05,
    2.7139006e-05, 2.8902651e-05, 3.0780908e-05, 3.2781225e-05,
    3.4911534e-05, 3.7180282e-05, 3.9596466e-05, 4.2169667e-05,
    4.4910090e-05, 4.7828601e-05, 5.0936773e-05, 5.4246931e-05,
    5.7772202e-05, 6.1526565e-05, 6.5524908e-05, 6.9783085e-05,
    7.4317983e-05, 7.9147585e-05, 8.4291040e-05, 8.9768747e-05,
    9.5602426e-05, 0.00010181521, 0.00010843174, 0.00011547824,
    0.00012298267, 0.00013097477, 0.00013948625, 0.00014855085,
    0.00015820453, 0.00016848555, 0.00017943469, 0.00019109536,
    0.00020351382, 0.00021673929, 0.00023082423, 0.00024582449,
    0.00026179955, 0.00027881276, 0.00029693158, 0.00031622787,
    0.00033677814, 0.00035866388, 0.00038197188, 0.00040679456,
    0.00043323036, 0.00046138411, 0.00049136745, 0.00052329927,
    0.00055730621, 0.00059352311, 0.00063209358, 0.00067317058,
    0.00071691700, 0.00076350630, 0.00081312324, 0.00086596457,
    0.00092223983, 0.00098217216, 0.0010459992,  0.0011139742,
    0.0011863665,  0.0012634633,  0.0013455702,  0.0014330129,
    0.0015261382,  0.0016253153,  0.0017309374,  0.0018434235,
    0.0019632195,  0.0020908006,  0.0022266726,  0.0023713743,
    0.0025254795,  0.0026895994,  0.0028643847,  0.0030505286,
    0.0032487691,  0.0034598925,  0.0036847358,  0.0039241906,
    0.0041792066,  0.0044507950,  0.0047400328,  0.0050480668,
    0.0053761186,  0.0057254891,  0.0060975636,  0.0064938176,
    0.0069158225,  0.0073652516,  0.0078438871,  0.0083536271,
    0.0088964928,  0.009474637,   0.010090352,   0.010746080,
    0.011444421,   0.012188144,   0.012980198,   0.013823725,
    0.014722068,   0.015678791,   0.016697687,   0.017782797,
    0.018938423,   0.020169149,   0.021479854,   0.022875735,
    0.024362330,   0.025945531,   0.027631618,   0.029427276,
    0.031339626,   0.033376252,   0.035545228,   0.037855157,
    0.040315199,   0.042935108,   0.045725273,   0.048696758,
    0.051861348,   0.055231591,   0.058820850,   0.062643361,
    0.066714279,   0.071049749,   0.075666962,   0.080584227,
    0.085821044,   0.091398179,   0.097337747,   0.10366330,
    0.11039993,    0.11757434,    0.12521498,    0.13335215,
    0.14201813,    0.15124727,    0.16107617,    0.17154380,
    0.18269168,    0.19456402,    0.20720788,    0.22067342,
    0.23501402,    0.25028656,    0.26655159,    0.28387361,
    0.30232132,    0.32196786,    0.34289114,    0.36517414,
    0.38890521,    0.41417847,    0.44109412,    0.46975890,
    0.50028648,    0.53279791,    0.56742212,    0.60429640,
    0.64356699,    0.68538959,    0.72993007,    0.77736504,
    0.82788260,    0.88168307,    0.9389798,     1.0,
];

/// Floor amplitude range, selected by the multiplier (1 to 4).
pub const FLOOR1_RANGES: [u32; 4] = [256, 128, 84, 64];

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FloorError {
    #[error("floor uses {0} partitions")]
    TooManyPartitions(usize),
    #[error("floor uses {0} classes")]
    TooManyClasses(usize),
    #[error("floor has {0} control points")]
    TooManyValues(usize),
    #[error("floor refers to missing codebook {0}")]
    InvalidCodebook(usize),
    #[error("floor repeats control point x = {0}")]
    DuplicateX(u32),
    #[error("floor curve has {0} of the two endpoint values")]
    IncompleteCurve(usize),
    #[error(transparent)]
    Codebook(#[from] CodebookError),
    #[error(transparent)]
    BitRead(#[from] BitReadError),
}

#[derive(Debug, Clone)]
pub struct FloorClass {
    pub dimensions: usize,
    pub subclass_bits: u32,
    pub masterbook: Option<usize>,
    pub subclass_books: [Option<usize>; 8],
}

/// Floor type 1: a piecewise linear envelope over `x_list` control points.
#[derive(Debug, Clone)]
pub struct Floor {
    pub partition_classes: Vec<usize>,
    pub classes: Vec<FloorClass>,
    pub multiplier: u32,
    pub range_bits: u32,
    pub x_list: Vec<u32>,
    /// Positions in `x_list`, ordered by x value.
    sort_order: Vec<usize>,
    /// Low and high neighbor of each point, by x value among earlier points.
    neighbors: Vec<(usize, usize)>,
}

/// Y values decoded for one channel in one frame, in `x_list` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorCurve {
    pub y: Vec<i32>,
}

fn check_book(index: u32, codebooks: usize) -> Result<usize, FloorError> {
    let index = index as usize;
    if index >= codebooks {
        return Err(FloorError::InvalidCodebook(index));
    }

    Ok(index)
}

impl Floor {
    pub fn decode_setup(reader: &mut BitReader, codebooks: usize) -> Result<Self, FloorError> {
        let partitions = reader.read_bits(5)? as usize;
        if partitions > MAX_FLOOR_PARTITIONS {
            return Err(FloorError::TooManyPartitions(partitions));
        }

        let mut partition_classes = Vec::with_capacity(partitions);
        for _ in 0..partitions {
            partition_classes.push(reader.read_bits(4)? as usize);
        }

        let class_count = partition_classes.iter().max().map_or(0, |&class| class + 1);
        if class_count > MAX_FLOOR_CLASSES {
            return Err(FloorError::TooManyClasses(class_count));
        }

        let mut classes = Vec::with_capacity(class_count);
        for _ in 0..class_count {
            let dimensions = reader.read_bits(3)? as usize + 1;
            let subclass_bits = reader.read_bits(2)?;
            let masterbook = if subclass_bits > 0 {
                Some(check_book(reader.read_bits(8)?, codebooks)?)
            } else {
                None
            };

            // stored off by one, zero meaning no book
            let mut subclass_books = [None; 8];
            for book in subclass_books[..1 << subclass_bits].iter_mut() {
                *book = match reader.read_bits(8)? {
                    0 => None,
                    index => Some(check_book(index - 1, codebooks)?),
                };
            }

            classes.push(FloorClass {
                dimensions,
                subclass_bits,
                masterbook,
                subclass_books,
            });
        }

        let multiplier = reader.read_bits(2)? + 1;
        let range_bits = reader.read_bits(4)?;

        let mut x_list = Vec::with_capacity(MAX_FLOOR_VALUES);
        x_list.push(0);
        x_list.push(1 << range_bits);

        for &class in &partition_classes {
            for _ in 0..classes[class].dimensions {
                x_list.push(reader.read_bits(range_bits)?);
            }
        }

        if x_list.len() > MAX_FLOOR_VALUES {
            return Err(FloorError::TooManyValues(x_list.len()));
        }

        Self::new(partition_classes, classes, multiplier, range_bits, x_list)
    }

    pub fn new(
        partition_classes: Vec<usize>,
        classes: Vec<FloorClass>,
        multiplier: u32,
        range_bits: u32,
        x_list: Vec<u32>,
    ) -> Result<Self, FloorError> {
        let mut sort_order: Vec<usize> = (0..x_list.len()).collect();
        sort_order.sort_by_key(|&i| x_list[i]);

        if let Some(pair) = sort_order
            .windows(2)
            .find(|pair| x_list[pair[0]] == x_list[pair[1]])
        {
            return Err(FloorError::DuplicateX(x_list[pair[0]]));
        }

        let neighbors = (0..x_list.len())
            .map(|i| find_neighbors(&x_list, i))
            .collect();

        Ok(Self {
            partition_classes,
            classes,
            multiplier,
            range_bits,
            x_list,
            sort_order,
            neighbors,
        })
    }

    pub fn range(&self) -> u32 {
        FLOOR1_RANGES[self.multiplier as usize - 1]
    }

    /// Reads one channel's floor. `None` means the floor is unused in this
    /// frame and the channel carries no energy.
    pub fn decode_frame(
        &self,
        reader: &mut BitReader,
        codebooks: &[Codebook],
    ) -> Result<Option<FloorCurve>, FloorError> {
        if !reader.read_flag()? {
            return Ok(None);
        }

        let y_bits = ilog(self.range() - 1);

        let mut y = Vec::with_capacity(self.x_list.len());
        y.push(reader.read_bits(y_bits)? as i32);
        y.push(reader.read_bits(y_bits)? as i32);

        for &class in &self.partition_classes {
            let class = &self.classes[class];
            let csub = (1 << class.subclass_bits) - 1;

            let mut cval = match class.masterbook {
                Some(book) => codebooks[book].decode_scalar(reader)?,
                None => 0,
            };

            for _ in 0..class.dimensions {
                let book = class.subclass_books[(cval & csub) as usize];
                cval >>= class.subclass_bits;

                y.push(match book {
                    Some(book) => codebooks[book].decode_scalar(reader)? as i32,
                    None => 0,
                });
            }
        }

        Ok(Some(FloorCurve { y }))
    }

    /// Turns decoded Y values into the linear amplitude curve of `n` values.
    pub fn synthesize(&self, curve: &FloorCurve, n: usize) -> Result<Vec<f32>, FloorError> {
        let count = self.x_list.len().min(curve.y.len());
        if count < 2 {
            return Err(FloorError::IncompleteCurve(count));
        }

        let (final_y, used) = self.reconstruct(curve);

        Ok(self
            .render(&final_y, &used, n)
            .into_iter()
            .map(|y| FLOOR1_INVERSE_DB_TABLE[y.clamp(0, 255) as usize])
            .collect())
    }

    /// Predicts each point from its neighbors and applies the decoded
    /// residual. Points with a zero residual take the prediction and are not
    /// drawn.
    fn reconstruct(&self, curve: &FloorCurve) -> (Vec<i32>, Vec<bool>) {
        let range = self.range() as i32;
        let count = self.x_list.len().min(curve.y.len());

        let mut final_y = curve.y[..count].to_vec();
        let mut used = vec![false; count];
        used[..2.min(count)].fill(true);

        for i in 2..count {
            let (low, high) = self.neighbors[i];

            let predicted = render_point(
                self.x_list[low],
                final_y[low],
                self.x_list[high],
                final_y[high],
                self.x_list[i],
            );

            let val = curve.y[i];
            let highroom = range - predicted;
            let lowroom = predicted;
            let room = 2 * highroom.min(lowroom);

            if val == 0 {
                final_y[i] = predicted;
                continue;
            }

            used[low] = true;
            used[high] = true;
            used[i] = true;

            final_y[i] = if val >= room {
                if highroom > lowroom {
                    val - lowroom + predicted
                } else {
                    predicted - val + highroom - 1
                }
            } else if val & 1 == 1 {
                predicted - (val + 1) / 2
            } else {
                predicted + val / 2
            };
        }

        (final_y, used)
    }

    /// Draws the used points as connected line segments, in x order, and
    /// extends the last one flat to `n`.
    fn render(&self, final_y: &[i32], used: &[bool], n: usize) -> Vec<i32> {
        let multiplier = self.multiplier as i32;
        let mut out = vec![0; n];

        let mut points = self
            .sort_order
            .iter()
            .copied()
            .filter(|&i| i < used.len() && used[i]);

        let Some(first) = points.next() else {
            return out;
        };

        let (mut lx, mut ly) = (0, final_y[first] * multiplier);
        let (mut hx, mut hy) = (0, 0);

        for i in points {
            hx = self.x_list[i];
            hy = final_y[i] * multiplier;

            render_line(lx, ly, hx, hy, &mut out);

            lx = hx;
            ly = hy;
        }

        if (hx as usize) < n {
            render_line(hx, hy, n as u32, hy, &mut out);
        }

        out
    }
}

/// Nearest earlier points below and above `x_list[i]`, by value.
fn find_neighbors(x_list: &[u32], i: usize) -> (usize, usize) {
    let x = x_list[i];

    let (mut low, mut high) = (0, 0);
    let (mut low_x, mut high_x) = (None, None);

    for (n, &value) in x_list[..i].iter().enumerate() {
        if value < x && low_x.is_none_or(|low_x| value > low_x) {
            low = n;
            low_x = Some(value);
        }

        if value > x && high_x.is_none_or(|high_x| value < high_x) {
            high = n;
            high_x = Some(value);
        }
    }

    (low, high)
}

fn render_point(x0: u32, y0: i32, x1: u32, y1: i32, x: u32) -> i32 {
    let dy = y1 - y0;
    let adx = (x1 - x0) as i64;
    let err = dy.unsigned_abs() as i64 * (x - x0) as i64;
    let off = (err / adx) as i32;

    if dy < 0 { y0 - off } else { y0 + off }
}

/// Integer line from `(x0, y0)` up to but excluding `x1`, clipped to `out`.
fn render_line(x0: u32, y0: i32, x1: u32, y1: i32, out: &mut [i32]) {
    let dy = y1 - y0;
    let adx = (x1 - x0) as i32;
    let base = dy / adx;
    let sy = if dy < 0 { base - 1 } else { base + 1 };
    let ady = dy.abs() - base.abs() * adx;

    let (x0, x1) = (x0 as usize, (x1 as usize).min(out.len()));
    if x0 >= x1 {
        return;
    }

    let mut y = y0;
    let mut err = 0;
    out[x0] = y;

    for out in out[x0 + 1..x1].iter_mut() {
        err += ady;

        y += if err >= adx {
            err -= adx;
            sy
        } else {
            base
        };

        *out = y;
    }
}

#[cfg(test)]
mod test {
    use super::{
        FLOOR1_INVERSE_DB_TABLE, Floor, FloorClass, FloorCurve, FloorError, render_line,
        render_point,
    };
    use crate::vorbis::{
        bits::BitReader,
        codebook::{Codebook, assign_codewords},
        testing::BitWriter,
    };

    fn single_class_floor(x_list: Vec<u32>) -> Floor {
        let class = FloorClass {
            dimensions: x_list.len() - 2,
            subclass_bits: 0,
            masterbook: None,
            subclass_books: [None; 8],
        };

        // multiplier 2 -> range 128
        Floor::new(vec![0], vec![class], 2, 7, x_list).unwrap()
    }

    #[test]
    fn lines_match_points() {
        for &(x0, y0, x1, y1) in &[(0, 20, 128, 100), (3, 90, 40, 7), (0, 5, 9, 5), (2, 0, 3, 200)] {
            let mut out = vec![i32::MIN; 128];
            render_line(x0, y0, x1, y1, &mut out);

            for x in x0..x1 {
                assert_eq!(out[x as usize], render_point(x0, y0, x1, y1, x), "x = {x}");
            }
        }
    }

    #[test]
    fn lines_are_clipped() {
        let mut out = vec![0; 4];
        render_line(2, 10, 100, 10, &mut out);
        assert_eq!(out, vec![0, 0, 10, 10]);

        render_line(8, 1, 9, 1, &mut out);
        assert_eq!(out, vec![0, 0, 10, 10]);
    }

    #[test]
    fn zero_residual_interpolates() {
        let floor = single_class_floor(vec![0, 128, 32, 64, 96]);
        let curve = FloorCurve {
            y: vec![10, 50, 0, 0, 0],
        };

        let amplitude = floor.synthesize(&curve, 128).unwrap();
        assert_eq!(amplitude.len(), 128);

        for (x, &value) in amplitude.iter().enumerate() {
            let y = render_point(0, 20, 128, 100, x as u32);
            assert_eq!(value, FLOOR1_INVERSE_DB_TABLE[y as usize]);
        }

        assert_eq!(floor.synthesize(&curve, 128).unwrap(), amplitude);
    }

    #[test]
    fn residuals_fold_around_the_prediction() {
        let floor = single_class_floor(vec![0, 128, 64]);

        // prediction at x = 64 is 30, low room 30, high room 98
        let cases = [(0, 30, false), (4, 32, true), (5, 27, true), (70, 70, true)];
        for (val, expected, drawn) in cases {
            let (final_y, used) = floor.reconstruct(&FloorCurve {
                y: vec![10, 50, val],
            });

            assert_eq!(final_y[2], expected, "val = {val}");
            assert_eq!(used, vec![true, true, drawn]);
        }

        // high room is the smaller one near the top of the range
        let (final_y, _) = floor.reconstruct(&FloorCurve {
            y: vec![120, 120, 40],
        });
        assert_eq!(final_y[2], 120 - 40 + 8 - 1);
    }

    #[test]
    fn range_per_multiplier() {
        let ranges: Vec<u32> = (1..=4)
            .map(|multiplier| Floor::new(vec![], vec![], multiplier, 4, vec![0, 16]).unwrap().range())
            .collect();

        assert_eq!(ranges, vec![256, 128, 84, 64]);
    }

    #[test]
    fn short_curves_are_rejected() {
        let floor = single_class_floor(vec![0, 128, 64]);

        for y in [vec![], vec![40]] {
            let count = y.len();
            assert_eq!(
                floor.synthesize(&FloorCurve { y }, 128),
                Err(FloorError::IncompleteCurve(count))
            );
        }

        let empty = Floor::new(vec![], vec![], 1, 4, vec![]).unwrap();
        assert_eq!(
            empty.synthesize(&FloorCurve { y: vec![10, 20] }, 16),
            Err(FloorError::IncompleteCurve(0))
        );

        // endpoints alone still draw a line
        let amplitude = floor.synthesize(&FloorCurve { y: vec![10, 50] }, 128).unwrap();
        assert_eq!(amplitude[0], FLOOR1_INVERSE_DB_TABLE[20]);
        assert_eq!(amplitude[127], FLOOR1_INVERSE_DB_TABLE[render_point(0, 20, 128, 100, 127) as usize]);
    }

    #[test]
    fn neighbors_follow_x_values() {
        let floor = single_class_floor(vec![0, 128, 64, 32, 96, 48]);

        assert_eq!(floor.neighbors[2], (0, 1));
        assert_eq!(floor.neighbors[3], (0, 2));
        assert_eq!(floor.neighbors[4], (2, 1));
        assert_eq!(floor.neighbors[5], (3, 2));
        assert_eq!(floor.sort_order, vec![0, 3, 5, 2, 4, 1]);
    }

    fn setup_bits(x_values: [u32; 2], masterbook: u32) -> Vec<u8> {
        let mut w = BitWriter::new();

        // one partition of class 0
        w.write(1, 5);
        w.write(0, 4);
        // class 0: 2 dimensions, 1 subclass bit
        w.write(1, 3);
        w.write(1, 2);
        w.write(masterbook, 8);
        w.write(0, 8);
        w.write(2, 8);
        // multiplier 2, range bits 4
        w.write(1, 2);
        w.write(4, 4);
        for x in x_values {
            w.write(x, 4);
        }

        w.finish()
    }

    #[test]
    fn setup_reads_classes_and_x_list() {
        let bytes = setup_bits([5, 12], 0);
        let floor = Floor::decode_setup(&mut BitReader::new(&bytes), 2).unwrap();

        assert_eq!(floor.partition_classes, vec![0]);
        assert_eq!(floor.classes.len(), 1);
        assert_eq!(floor.classes[0].dimensions, 2);
        assert_eq!(floor.classes[0].masterbook, Some(0));
        assert_eq!(floor.classes[0].subclass_books[..2], [None, Some(1)]);
        assert_eq!(floor.multiplier, 2);
        assert_eq!(floor.range(), 128);
        assert_eq!(floor.x_list, vec![0, 16, 5, 12]);
    }

    #[test]
    fn setup_rejects_bad_tables() {
        let bytes = setup_bits([5, 5], 0);
        assert!(matches!(
            Floor::decode_setup(&mut BitReader::new(&bytes), 2),
            Err(FloorError::DuplicateX(5))
        ));

        let bytes = setup_bits([5, 12], 3);
        assert!(matches!(
            Floor::decode_setup(&mut BitReader::new(&bytes), 2),
            Err(FloorError::InvalidCodebook(3))
        ));
    }

    #[test]
    fn frame_selects_subclass_books() {
        let bytes = setup_bits([5, 12], 0);
        let floor = Floor::decode_setup(&mut BitReader::new(&bytes), 2).unwrap();

        let books: Vec<Codebook> = (0..2)
            .map(|_| {
                let words = assign_codewords(&[Some(2); 4]).unwrap();
                Codebook::new(1, 4, words, None)
            })
            .collect();

        let mut w = BitWriter::new();
        w.write(1, 1);
        w.write(10, 7);
        w.write(50, 7);
        // master entry 2: first slot has no book, second uses book 1
        w.write_code("10");
        w.write_code("11");
        let bytes = w.finish();

        let curve = floor
            .decode_frame(&mut BitReader::new(&bytes), &books)
            .unwrap()
            .unwrap();
        assert_eq!(curve.y, vec![10, 50, 0, 3]);

        assert_eq!(floor.decode_frame(&mut BitReader::new(&[0]), &books), Ok(None));
    }
}
