//! The builtin AWK library embedded in every generated program, plus the
//! compat shim for runtimes that lack the gawk extensions.

pub(crate) const AWK_PRELUDE: &str = r#"
function agg_percentile(arr, n,   local_cnt, local_i, local_kv) {
  # observations are kv pairs keyed by order_key, so asort yields them in
  # value order and the raw value is recovered from the kv payload
  local_cnt = asort(arr);
  local_i = int((n * local_cnt) / 100);
  local_i = local_i > local_cnt ? local_cnt : local_i;
  local_i = local_i <= 0 ? 1 : local_i;
  return kv_getv(arr[local_i ""], local_kv);
}

function order_key(v,   local_typeof) {
  local_typeof = typeof(v);
  if (local_typeof == "strnum" ||
      local_typeof == "number" ||
      local_typeof == "number|bool") {
    if (is_decimal(v)) {
      return sprintf("%24f", (v+0.0));
    } else {
      return sprintf("%20d", (v+0));
    }
  } else {
    return v"";
  }
}

# helper to support histogram calculation
function agg_histogram(input, input_start, input_size,
                       minval, maxval, numbin, osep,
                       local_step, local_cur, local_bin, local_i, local_v, local_j, local_out) {
  if (numbin <= 0 || (maxval < minval)) {
    return "[invalid input]";
  }

  local_step = (maxval - minval) / numbin;
  if (length(osep) == 0) {
    osep = ":";
  }

  for (local_i = 0; local_i <= numbin+1; local_i++) {
    local_bin[local_i] = 0;
  }

  for (local_i = input_start; local_i <= input_size; local_i++) {
    local_v = input[local_i ""];
    local_cur = minval;

    for (local_j = 1; local_j <= numbin; local_j++) {
      if (local_v < local_cur) {
        # previous bin is the one we are targeting
        local_j = local_j - 1;
        break;
      } else {
        local_cur += local_step;
      }
    }

    local_bin[local_j]++;
  }

  local_out = array_join(local_bin, 1, numbin, osep);
  return sprintf("!%d%s%s%s!%d", local_bin[0], osep, local_out, osep, local_bin[numbin+1]);
}

function array_join(array, start, end, sep,   local_result, local_i) {
  if (sep == "")
    sep = ";";
  local_result = array[start];
  for (local_i = start + 1; local_i <= end; local_i++)
    local_result = local_result sep array[local_i];
  return local_result;
}

# type assertions and conversions
function is_number(v,   local_t) {
  local_t = typeof(v);
  return local_t == "number" || local_t == "strnum" || local_t == "number|bool";
}

function is_decimal(v) {
  return (v - int(v)) != 0.0;
}

function is_integer(v) {
  return is_number(v) && !is_decimal(v);
}

function is_string(v,   local_t) {
  local_t = typeof(v);
  return local_t == "string" || local_t == "strnum";
}

function is_null(v) {
  return length(v) == 0;
}

function cast(v, ty) {
  if (ty == "int") {
    return int(v+0);
  } else if (ty == "float") {
    return v+0.0;
  } else if (ty == "string") {
    return v"";
  } else {
    return v;
  }
}

function clear_array(x) {
  split("", x);
}

# key/value encoding used by the percentile buckets
function kv_make(k, v) {
  return sprintf("%s:%s", k, v);
}

function kv_getv(kv, lv) {
  split(kv, lv, ":");
  return lv[2];
}

# runtime rendition of the LIKE wildcard translation
function like2r(pat,   local_i, local_n, local_c, local_cc, local_out) {
  local_out = "^";
  local_n = length(pat);
  for (local_i = 1; local_i <= local_n; local_i++) {
    local_c = substr(pat, local_i, 1);
    if (local_c == "%") {
      if (local_i + 3 <= local_n &&
          substr(pat, local_i+1, 1) == "[" &&
          substr(pat, local_i+3, 1) == "]") {
        local_cc = substr(pat, local_i+2, 1);
        local_out = local_out like2r_enc(local_cc);
        local_i += 3;
      } else {
        local_out = local_out ".*";
      }
    } else if (local_c == "_") {
      local_out = local_out ".";
    } else {
      local_out = local_out like2r_enc(local_c);
    }
  }
  return local_out "$";
}

function like2r_enc(c) {
  if (c == "[") return "\\[";
  if (c == "]") return "\\]";
  return "[" c "]";
}
"#;

/// goawk misses typeof/asort/asorti; the stubs keep the prelude loadable
/// (ORDER BY is rejected for this backend before emission).
pub(crate) const GOAWK_PRELUDE: &str = r#"
# goawk does not support typeof
function typeof(obj,   q, x, z) {
  q = CONVFMT
  CONVFMT = "% g"
    split(" " obj "\1" obj, x, "\1")
    x[1] = obj == x[1]
    x[2] = obj == x[2]
    x[3] = obj == 0
    x[4] = obj "" == +obj
  CONVFMT = q
  z["0001"] = z["1101"] = z["1111"] = "number"
  z["0100"] = z["0101"] = z["0111"] = "string"
  z["1100"] = z["1110"] = "strnum"
  z["0110"] = "undefined"
  return z[x[1] x[2] x[3] x[4]]
}

# goawk does not support asort
function asort(a, b, c) {
}

function asorti(a, b, c) {
}
"#;
