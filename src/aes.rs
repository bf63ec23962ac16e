// AES-128 block cipher backing the reference oracle.
//
// The state is held row-major, so round keys after the first are stored
// transposed to match it.
pub const AES_BLOCK_SIZE: usize = 16;

pub type Block = [u8; AES_BLOCK_SIZE];

#[rustfmt::skip]
const S_BOX: [[u8; 16]; 16] = [
    [ 99, 124, 119, 123, 242, 107, 111, 197,  48,   1, 103,  43, 254, 215, 171, 118],
    [202, 130, 201, 125, 250,  89,  71, 240, 173, 212, 162, 175, 156, 164, 114, 192],
    [183, 253, 147,  38,  54,  63, 247, 204,  52, 165, 229, 241, 113, 216,  49,  21],
    [  4, 199,  35, 195,  24, 150,   5, 154,   7,  18, 128, 226, 235,  39, 178, 117],
    [  9, 131,  44,  26,  27, 110,  90, 160,  82,  59, 214, 179,  41, 227,  47, 132],
    [ 83, 209,   0, 237,  32, 252, 177,  91, 106, 203, 190,  57,  74,  76,  88, 207],
    [208, 239, 170, 251,  67,  77,  51, 133,  69, 249,   2, 127,  80,  60, 159, 168],
    [ 81, 163,  64, 143, 146, 157,  56, 245, 188, 182, 218,  33,  16, 255, 243, 210],
    [205,  12,  19, 236,  95, 151,  68,  23, 196, 167, 126,  61, 100,  93,  25, 115],
    [ 96, 129,  79, 220,  34,  42, 144, 136,  70, 238, 184,  20, 222,  94,  11, 219],
    [224,  50,  58,  10,  73,   6,  36,  92, 194, 211, 172,  98, 145, 149, 228, 121],
    [231, 200,  55, 109, 141, 213,  78, 169, 108,  86, 244, 234, 101, 122, 174,   8],
    [186, 120,  37,  46,  28, 166, 180, 198, 232, 221, 116,  31,  75, 189, 139, 138],
    [112,  62, 181, 102,  72,   3, 246,  14,  97,  53,  87, 185, 134, 193,  29, 158],
    [225, 248, 152,  17, 105, 217, 142, 148, 155,  30, 135, 233, 206,  85,  40, 223],
    [140, 161, 137,  13, 191, 230,  66, 104,  65, 153,  45,  15, 176,  84, 187,  22],
];

#[rustfmt::skip]
const INV_S_BOX: [[u8; 16]; 16] = [
    [ 82,   9, 106, 213,  48,  54, 165,  56, 191,  64, 163, 158, 129, 243, 215, 251],
    [124, 227,  57, 130, 155,  47, 255, 135,  52, 142,  67,  68, 196, 222, 233, 203],
    [ 84, 123, 148,  50, 166, 194,  35,  61, 238,  76, 149,  11,  66, 250, 195,  78],
    [  8,  46, 161, 102,  40, 217,  36, 178, 118,  91, 162,  73, 109, 139, 209,  37],
    [114, 248, 246, 100, 134, 104, 152,  22, 212, 164,  92, 204,  93, 101, 182, 146],
    [108, 112,  72,  80, 253, 237, 185, 218,  94,  21,  70,  87, 167, 141, 157, 132],
    [144, 216, 171,   0, 140, 188, 211,  10, 247, 228,  88,   5, 184, 179,  69,   6],
    [208,  44,  30, 143, 202,  63,  15,   2, 193, 175, 189,   3,   1,  19, 138, 107],
    [ 58, 145,  17,  65,  79, 103, 220, 234, 151, 242, 207, 206, 240, 180, 230, 115],
    [150, 172, 116,  34, 231, 173,  53, 133, 226, 249,  55, 232,  28, 117, 223, 110],
    [ 71, 241,  26, 113,  29,  41, 197, 137, 111, 183,  98,  14, 170,  24, 190,  27],
    [252,  86,  62,  75, 198, 210, 121,  32, 154, 219, 192, 254, 120, 205,  90, 244],
    [ 31, 221, 168,  51, 136,   7, 199,  49, 177,  18,  16,  89,  39, 128, 236,  95],
    [ 96,  81, 127, 169,  25, 181,  74,  13,  45, 229, 122, 159, 147, 201, 156, 239],
    [160, 224,  59,  77, 174,  42, 245, 176, 200, 235, 187,  60, 131,  83, 153,  97],
    [ 23,  43,   4, 126, 186, 119, 214,  38, 225, 105,  20,  99,  85,  33,  12, 125]
];

#[rustfmt::skip]
const MIX_MATRIX: [u8; 16] = [
    2, 3, 1, 1,
    1, 2, 3, 1,
    1, 1, 2, 3,
    3, 1, 1, 2,
];

#[rustfmt::skip]
const INV_MIX_MATRIX: [u8; 16] = [
    14, 11, 13, 9,
     9, 14, 11, 13,
    13,  9, 14, 11,
    11, 13,  9, 14
];

const ROUND_CONSTANTS: [u8; 10] = [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80, 0x1B, 0x36];

#[derive(Debug, Clone)]
pub struct Aes128 {
    round_keys: [Block; 11],
}

impl Aes128 {
    pub fn new(key: &Block) -> Self {
        let mut round_keys = expand_key(key);
        round_keys
            .iter_mut()
            .skip(1)
            .for_each(|k| transpose_matrix(k, 4));
        Self { round_keys }
    }

    pub fn encrypt_block(&self, plaintext: &Block) -> Block {
        let mut whitened = *plaintext;
        xor_into(&mut whitened, &self.round_keys[0]);
        let mut state = StateMatrix::new(&whitened);
        for round_key in &self.round_keys[1..10] {
            state.substitute_bytes();
            state.shift_rows();
            state.mix();
            state.xor(round_key);
        }
        // No mix stage in the final round.
        state.substitute_bytes();
        state.shift_rows();
        state.xor(&self.round_keys[10]);
        state.into_block()
    }

    pub fn decrypt_block(&self, ciphertext: &Block) -> Block {
        let mut state = StateMatrix::new(ciphertext);
        state.xor(&self.round_keys[10]);
        for round_key in self.round_keys[1..10].iter().rev() {
            state.inv_shift_rows();
            state.inv_substitute_bytes();
            state.xor(round_key);
            state.inv_mix();
        }
        state.inv_shift_rows();
        state.inv_substitute_bytes();
        let mut first_key = self.round_keys[0];
        transpose_matrix(&mut first_key, 4);
        state.xor(&first_key);
        state.into_block()
    }
}

#[derive(Debug, PartialEq, Eq)]
struct StateMatrix(Block);

impl StateMatrix {
    fn new(block: &Block) -> Self {
        let mut state = *block;
        transpose_matrix(&mut state, 4);
        Self(state)
    }

    fn into_block(self) -> Block {
        let mut block = self.0;
        transpose_matrix(&mut block, 4);
        block
    }

    fn substitute_bytes(&mut self) {
        self.0
            .iter_mut()
            .for_each(|byte| *byte = s_box_substitute(*byte, &S_BOX));
    }

    fn inv_substitute_bytes(&mut self) {
        self.0
            .iter_mut()
            .for_each(|byte| *byte = s_box_substitute(*byte, &INV_S_BOX));
    }

    fn shift_rows(&mut self) {
        for (i, row) in self.0.chunks_exact_mut(4).enumerate().skip(1) {
            row.rotate_left(i);
        }
    }

    fn inv_shift_rows(&mut self) {
        for (i, row) in self.0.chunks_exact_mut(4).enumerate().skip(1) {
            row.rotate_right(i);
        }
    }

    fn mix(&mut self) {
        self.0 = StateMatrix::matrix_multiply(&MIX_MATRIX, &self.0);
    }

    fn inv_mix(&mut self) {
        self.0 = StateMatrix::matrix_multiply(&INV_MIX_MATRIX, &self.0);
    }

    fn xor(&mut self, bytes: &Block) {
        xor_into(&mut self.0, bytes);
    }

    fn matrix_multiply(a: &Block, b: &Block) -> Block {
        let n = 4;
        let mut out = [0u8; AES_BLOCK_SIZE];
        for i in 0..n {
            for j in 0..n {
                out[i * n + j] = (0..n).fold(0, |sum, k| {
                    sum ^ StateMatrix::galois_multiply(a[i * n + k], b[j + n * k])
                });
            }
        }
        out
    }

    fn galois_multiply(mut a: u8, mut b: u8) -> u8 {
        let mut product = 0;
        for _ in 0..8 {
            if (b & 1) > 0 {
                product ^= a;
            }
            let carry = a & 0x80;
            a <<= 1;
            if carry > 0 {
                a ^= 0x1B;
            }
            b >>= 1;
        }
        product
    }
}

fn xor_into(target: &mut Block, bytes: &Block) {
    target.iter_mut().zip(bytes).for_each(|(t, b)| *t ^= b);
}

fn transpose_matrix(matrix: &mut [u8], n: usize) {
    // Only walk the upper triangle to avoid swapping back.
    for i in 0..n {
        for j in i + 1..n {
            matrix.swap(i * n + j, j * n + i);
        }
    }
}

fn expand_key(key: &Block) -> [Block; 11] {
    let mut round_keys = [[0u8; AES_BLOCK_SIZE]; 11];
    round_keys[0] = *key;
    for round in 0..10 {
        let prev = round_keys[round];
        let mut word = [prev[12], prev[13], prev[14], prev[15]];
        word.rotate_left(1);
        word.iter_mut()
            .for_each(|byte| *byte = s_box_substitute(*byte, &S_BOX));
        word[0] ^= ROUND_CONSTANTS[round];

        let mut next = [0u8; AES_BLOCK_SIZE];
        for i in 0..AES_BLOCK_SIZE {
            let feed = if i < 4 { word[i] } else { next[i - 4] };
            next[i] = prev[i] ^ feed;
        }
        round_keys[round + 1] = next;
    }
    round_keys
}

fn s_box_substitute(byte: u8, table: &[[u8; 16]; 16]) -> u8 {
    let first_nibble = ((0b11110000 & byte) >> 4) as usize;
    let second_nibble = (0b00001111 & byte) as usize;
    table[first_nibble][second_nibble]
}
